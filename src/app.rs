//! Interactive command handling for the CalSnap terminal.

use crate::batch::CancelToken;
use crate::config::Config;
use crate::export;
use crate::filter::FilterCriteria;
use crate::llm::{self, Attachment};
use crate::pipeline;
use crate::remote::{CalendarStore, RemoteError, RestCalendarStore, DEFAULT_API_BASE};
use crate::state::WorkingSet;
use crate::validation::parse_date;
use anyhow::{anyhow, bail, Result};
use log::{error, info};
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::Path;

/// Command line arguments structure
#[derive(Debug)]
pub struct CommandArgs {
    pub command: String,
    pub args: Vec<String>,
    pub flags: HashMap<String, Option<String>>,
}

impl CommandArgs {
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;

        for c in input.chars() {
            match c {
                '"' => {
                    in_quotes = !in_quotes;
                    if !in_quotes && !current.is_empty() {
                        parts.push(current.clone());
                        current.clear();
                    }
                }
                ' ' if !in_quotes => {
                    if !current.is_empty() {
                        parts.push(current.clone());
                        current.clear();
                    }
                }
                _ => current.push(c),
            }
        }
        if !current.is_empty() {
            parts.push(current);
        }

        if parts.is_empty() {
            return Err(anyhow!("No command provided"));
        }

        let command = parts.remove(0);
        let mut args = Vec::new();
        let mut flags = HashMap::new();
        let mut i = 0;

        while i < parts.len() {
            if parts[i].starts_with("--") {
                let flag = parts[i].clone();
                if i + 1 < parts.len() && !parts[i + 1].starts_with("--") {
                    flags.insert(flag, Some(parts[i + 1].clone()));
                    i += 1;
                } else {
                    flags.insert(flag, None);
                }
            } else {
                args.push(parts[i].clone());
            }
            i += 1;
        }

        Ok(CommandArgs { command, args, flags })
    }

    fn flag_value(&self, flag: &str) -> Option<&str> {
        self.flags.get(flag).and_then(|v| v.as_deref())
    }
}

pub struct Application {
    config: Config,
    working: WorkingSet,
    store: Option<RestCalendarStore>,
    remote_cache: Vec<crate::remote::RemoteEvent>,
}

impl Application {
    pub fn new() -> Result<Self> {
        Ok(Self {
            config: Config::load()?,
            working: WorkingSet::new(),
            store: None,
            remote_cache: Vec::new(),
        })
    }

    pub async fn process_command(&mut self, line: &str) -> Result<()> {
        let args = CommandArgs::parse(line)?;
        let result = match args.command.as_str() {
            "extract" => self.cmd_extract(&args).await,
            "list" => self.cmd_list(),
            "edit" => self.cmd_edit(&args),
            "select" => self.cmd_select(&args),
            "remove" => self.cmd_remove(&args),
            "push" => self.cmd_push().await,
            "events" => self.cmd_events(&args).await,
            "delete" => self.cmd_delete(&args).await,
            "patch" => self.cmd_patch(&args).await,
            "export" => self.cmd_export(&args),
            "help" => {
                print_help();
                Ok(())
            }
            "exit" => {
                std::process::exit(0);
            }
            _ => {
                println!("Unknown command. Type 'help' for available commands.");
                Ok(())
            }
        };
        if let Err(err) = &result {
            self.note_auth_failure(err);
        }
        result
    }

    /// Lazily build the store client (cheap to clone, the http client is
    /// shared). The token comes from the environment; acquiring it (the
    /// OAuth dance) is outside this program.
    fn store(&mut self) -> Result<RestCalendarStore> {
        if self.store.is_none() {
            let token = std::env::var("CALENDAR_API_TOKEN").map_err(|_| {
                anyhow!("CALENDAR_API_TOKEN environment variable not set. Sign in and export a token first.")
            })?;
            let base = self
                .config
                .sync
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
            self.store = Some(RestCalendarStore::new(&base, SecretString::from(token))?);
        }
        Ok(self.store.as_ref().unwrap().clone())
    }

    /// An auth rejection is fatal to this session's remote access: drop the
    /// client so the next remote command forces a fresh token. Extraction
    /// and local validation stay usable.
    fn note_auth_failure(&mut self, err: &anyhow::Error) {
        let auth = err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<RemoteError>())
            .any(RemoteError::requires_reauth);
        if auth {
            self.store = None;
            error!("remote access revoked for this session: {err:#}");
            println!("Authentication failed. Export a fresh CALENDAR_API_TOKEN and retry.");
        }
    }

    async fn cmd_extract(&mut self, args: &CommandArgs) -> Result<()> {
        let text = args.args.first().map(String::as_str);
        let attachment = match args.flag_value("--file") {
            Some(path) => Some(Attachment::from_path(Path::new(path))?),
            None => None,
        };
        if text.is_none() && attachment.is_none() {
            println!("Usage: extract \"<pasted text>\" [--file <path>]");
            return Ok(());
        }

        println!("Extracting events...");
        let ids = pipeline::import_from_model(&mut self.working, text, attachment.as_ref()).await?;
        println!("Extracted {} event(s).", ids.len());
        self.cmd_list()
    }

    fn cmd_list(&self) -> Result<()> {
        if self.working.is_empty() {
            println!("No events in the working set.");
            return Ok(());
        }
        for validated in self.working.records() {
            let r = &validated.record;
            let marker = if self.working.is_selected(r.id) { "*" } else { " " };
            let status = if validated.is_valid {
                "ok".to_string()
            } else {
                format!("INVALID ({})", validated.error_summary())
            };
            println!(
                "{}[{}] {} | {} {} - {} {} | {} | {}",
                marker, r.id, r.subject, r.start_date, r.start_time, r.end_date, r.end_time,
                r.location, status
            );
        }
        Ok(())
    }

    fn cmd_edit(&mut self, args: &CommandArgs) -> Result<()> {
        let Some(id) = args.args.first().and_then(|a| a.parse::<u64>().ok()) else {
            println!("Usage: edit <id> [--subject S] [--start-date D] [--start-time T] [--end-date D] [--end-time T] [--location L] [--description D] [--duration MINUTES]");
            return Ok(());
        };

        const FIELD_FLAGS: [(&str, &str); 7] = [
            ("--subject", "subject"),
            ("--start-date", "startDate"),
            ("--start-time", "startTime"),
            ("--end-date", "endDate"),
            ("--end-time", "endTime"),
            ("--location", "location"),
            ("--description", "description"),
        ];

        let mut touched = false;
        for (flag, field) in FIELD_FLAGS {
            if let Some(value) = args.flag_value(flag) {
                self.working.set_field(id, field, value)?;
                touched = true;
            }
        }
        if args.flags.contains_key("--duration") {
            let minutes = match args.flag_value("--duration") {
                Some(raw) => raw.parse()?,
                None => self.config.calendar.default_duration_minutes,
            };
            self.working.set_duration(id, minutes)?;
            touched = true;
        }
        if !touched {
            println!("Nothing to change.");
            return Ok(());
        }

        let stored = self.working.get(id).ok_or_else(|| anyhow!("no record with id {}", id))?;
        if stored.is_valid {
            println!("Record {} updated.", id);
        } else {
            println!("Record {} updated but invalid: {}", id, stored.error_summary());
        }
        Ok(())
    }

    fn cmd_select(&mut self, args: &CommandArgs) -> Result<()> {
        match args.args.first().map(String::as_str) {
            Some("all") => {
                let n = self.working.select_all_valid();
                println!("Selected {} valid record(s).", n);
            }
            Some("none") => {
                self.working.clear_selection();
                println!("Selection cleared.");
            }
            Some(raw) => {
                let id: u64 = raw.parse()?;
                self.working.select(id)?;
                println!("Selected record {}.", id);
            }
            None => println!("Usage: select <id|all|none>"),
        }
        Ok(())
    }

    fn cmd_remove(&mut self, args: &CommandArgs) -> Result<()> {
        let Some(id) = args.args.first().and_then(|a| a.parse::<u64>().ok()) else {
            println!("Usage: remove <id>");
            return Ok(());
        };
        if self.working.remove(id) {
            println!("Removed record {}.", id);
        } else {
            println!("No record with id {}.", id);
        }
        Ok(())
    }

    async fn cmd_push(&mut self) -> Result<()> {
        if self.working.selected_ids().is_empty() {
            println!("Nothing selected. Use 'select all' or 'select <id>' first.");
            return Ok(());
        }
        let calendar_id = self.config.calendar.default_calendar_id.clone();
        let options = self.config.batch_options();
        let cancel = CancelToken::new();
        let watcher = spawn_cancel_watcher(&cancel);

        let store = self.store()?;
        let outcome = pipeline::push_selected(
            &mut self.working,
            &store,
            &calendar_id,
            &options,
            &cancel,
            |done, total| println!("  {}/{} pushed", done, total),
        )
        .await?;
        watcher.abort();

        report_outcome(&outcome.failed, outcome.attempted, outcome.cancelled, "created");
        Ok(())
    }

    async fn cmd_events(&mut self, args: &CommandArgs) -> Result<()> {
        let from = parse_date_flag(args, "--from")?;
        let to = parse_date_flag(args, "--to")?;
        let calendar_id = self.config.calendar.default_calendar_id.clone();
        let store = self.store()?;
        let events = store.list(&calendar_id, from, to).await?;
        info!("fetched {} remote event(s)", events.len());
        for event in &events {
            println!("{}", event.display_line());
        }
        if events.is_empty() {
            println!("No remote events in that range.");
        }
        self.remote_cache = events;
        Ok(())
    }

    async fn cmd_delete(&mut self, args: &CommandArgs) -> Result<()> {
        let criteria = self.criteria_from(args).await?;
        if criteria.is_empty() {
            println!("Refusing to bulk-delete without a filter. Give --text/--location/--from/--to/--time or --query.");
            return Ok(());
        }

        let calendar_id = self.config.calendar.default_calendar_id.clone();
        if self.remote_cache.is_empty() {
            let store = self.store()?;
            self.remote_cache = store.list(&calendar_id, None, None).await?;
        }
        let targets: Vec<String> =
            criteria.select(&self.remote_cache).iter().map(|e| e.id.clone()).collect();
        if targets.is_empty() {
            println!("No remote events match.");
            return Ok(());
        }
        println!("Deleting {} event(s)...", targets.len());

        let options = self.config.batch_options();
        let cancel = CancelToken::new();
        let watcher = spawn_cancel_watcher(&cancel);
        let store = self.store()?;
        let outcome = pipeline::bulk_delete(
            &store,
            &calendar_id,
            targets,
            &options,
            &cancel,
            |done, total| println!("  {}/{} deleted", done, total),
        )
        .await?;
        watcher.abort();

        pipeline::reconcile_delete(&mut self.remote_cache, &outcome);
        report_outcome(&outcome.failed, outcome.attempted, outcome.cancelled, "deleted");
        Ok(())
    }

    async fn cmd_patch(&mut self, args: &CommandArgs) -> Result<()> {
        let mut patch = crate::remote::EventPatch::new();
        if let Some(summary) = args.flag_value("--set-subject") {
            patch = patch.summary(summary);
        }
        if let Some(location) = args.flag_value("--set-location") {
            patch = patch.location(location);
        }
        if let Some(description) = args.flag_value("--set-description") {
            patch = patch.description(description);
        }
        if patch.is_empty() {
            println!("Usage: patch --set-subject/--set-location/--set-description <value> plus a filter (--text/--location/--from/--to/--time or --query)");
            return Ok(());
        }

        let criteria = self.criteria_from(args).await?;
        if criteria.is_empty() {
            println!("Refusing to bulk-patch without a filter.");
            return Ok(());
        }

        let calendar_id = self.config.calendar.default_calendar_id.clone();
        if self.remote_cache.is_empty() {
            let store = self.store()?;
            self.remote_cache = store.list(&calendar_id, None, None).await?;
        }
        let targets: Vec<String> =
            criteria.select(&self.remote_cache).iter().map(|e| e.id.clone()).collect();
        if targets.is_empty() {
            println!("No remote events match.");
            return Ok(());
        }
        println!("Patching {} event(s)...", targets.len());

        let options = self.config.batch_options();
        let cancel = CancelToken::new();
        let watcher = spawn_cancel_watcher(&cancel);
        let store = self.store()?;
        let (outcome, refreshed) = pipeline::bulk_patch(
            &store,
            &calendar_id,
            targets,
            &patch,
            &options,
            &cancel,
            |done, total| println!("  {}/{} patched", done, total),
        )
        .await?;
        watcher.abort();

        // Patched state comes back from the store, never from local guesses.
        self.remote_cache = refreshed;
        report_outcome(&outcome.failed, outcome.attempted, outcome.cancelled, "patched");
        Ok(())
    }

    fn cmd_export(&mut self, args: &CommandArgs) -> Result<()> {
        let (format, path) = match (args.args.first(), args.args.get(1)) {
            (Some(format), Some(path)) => (format.as_str(), Path::new(path)),
            _ => {
                println!("Usage: export <csv|ics> <path>");
                return Ok(());
            }
        };
        match format {
            "csv" => export::export_csv(self.working.records(), path)?,
            "ics" => export::export_ics(self.working.records(), path)?,
            other => bail!("unknown export format {:?} (expected csv or ics)", other),
        }
        println!("Exported {} record(s) to {}.", self.working.records().len(), path.display());
        Ok(())
    }

    /// Criteria either from direct flags or, with --query, from the model's
    /// interpretation of a natural-language description.
    async fn criteria_from(&self, args: &CommandArgs) -> Result<FilterCriteria> {
        if let Some(query) = args.flag_value("--query") {
            return llm::interpret_filter_query(query).await;
        }
        Ok(FilterCriteria {
            date_from: parse_date_flag(args, "--from")?,
            date_to: parse_date_flag(args, "--to")?,
            text: args.flag_value("--text").map(str::to_string),
            location: args.flag_value("--location").map(str::to_string),
            time_of_day: args.flag_value("--time").map(str::to_string),
        })
    }
}

fn parse_date_flag(args: &CommandArgs, flag: &str) -> Result<Option<chrono::NaiveDate>> {
    match args.flag_value(flag) {
        None => Ok(None),
        Some(raw) => parse_date(raw)
            .map(Some)
            .ok_or_else(|| anyhow!("{} is not a valid date for {}", raw, flag)),
    }
}

fn report_outcome<T: std::fmt::Display>(
    failed: &[(T, String)],
    attempted: usize,
    cancelled: bool,
    verb: &str,
) {
    if cancelled {
        println!("Run cancelled after {} item(s).", attempted);
    }
    if failed.is_empty() {
        println!("{} item(s) {}.", attempted, verb);
    } else {
        println!("{} of {} items did not complete:", failed.len(), attempted);
        for (target, message) in failed {
            println!("  {}: {}", target, message);
        }
        println!("The failed items are left in place; retry when ready.");
    }
}

/// Cancel the token on Ctrl-C so an in-flight batch run stops between
/// chunks instead of running to completion.
fn spawn_cancel_watcher(cancel: &CancelToken) -> tokio::task::JoinHandle<()> {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    })
}

fn print_help() {
    println!("Available commands:");
    println!("  extract \"<text>\" [--file <path>]        - Extract events from text and/or a document/image");
    println!("  list                                      - Show the local working set");
    println!("  edit <id> --subject/--start-date/...      - Edit one record (full re-validation)");
    println!("  select <id|all|none>                      - Manage the selection");
    println!("  remove <id>                               - Drop a record from the working set");
    println!("  push                                      - Insert selected records into the remote calendar");
    println!("  events [--from D] [--to D]                - List remote events");
    println!("  delete --text/--location/--from/--to/--time | --query \"...\"  - Bulk-delete matching remote events");
    println!("  patch --set-location <v> <filter flags>   - Bulk-patch matching remote events");
    println!("  export <csv|ics> <path>                   - Export the working set");
    println!("  help                                      - Show this help");
    println!("  exit                                      - Exit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_quoted_arguments_and_flags() {
        let args =
            CommandArgs::parse("extract \"Meeting notes from today\" --file agenda.pdf").unwrap();
        assert_eq!(args.command, "extract");
        assert_eq!(args.args, vec!["Meeting notes from today"]);
        assert_eq!(args.flag_value("--file"), Some("agenda.pdf"));
    }

    #[test]
    fn flags_without_values_are_kept() {
        let args = CommandArgs::parse("select all --dry-run").unwrap();
        assert_eq!(args.args, vec!["all"]);
        assert!(args.flags.contains_key("--dry-run"));
        assert_eq!(args.flag_value("--dry-run"), None);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(CommandArgs::parse("   ").is_err());
    }
}
