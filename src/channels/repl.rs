//! Interactive dashboard channel with line editing and markdown rendering.
//!
//! Provides the terminal interface for the console. Uses rustyline for line
//! editing, history, and tab-completion, and termimad for rendering tables
//! and completions inline.
//!
//! ## Commands
//!
//! - `/login`, `/register`, `/logout` - session management
//! - `/agents`, `/use <id>` - pick the working agent
//! - `/clients`, `/client <id>` - pick the working client
//! - `/metrics` - run the performance pipeline for the selected agent
//! - `/ask <guidance>` - compose a prompt from the selected conversation
//! - `/image <prompt>` - generate images
//! - `/panel <name>` - switch (and remember) the dashboard panel
//! - `/connect <url>` - persist a different backend base URL
//! - `/help`, `/quit` - the usual

use std::borrow::Cow;
use std::sync::Arc;

use base64::Engine;
use rustyline::completion::Completer;
use rustyline::config::Config as LineConfig;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::FileHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Editor, Helper};
use termimad::MadSkin;

use crate::api::ApiClient;
use crate::api::types::{Agent, AgentStatus, Client as ClientRecord};
use crate::config::Config;
use crate::error::ChannelError;
use crate::metrics::{MetricsEngine, PerformanceReport, Sender};
use crate::prompt::PromptComposer;
use crate::session::guard::{GuardState, RouteGuard};
use crate::session::{Credentials, LoginOutcome, RegisterDetails, RegisterOutcome, SessionStore};
use crate::settings::{Panel, Settings, default_settings_path};

/// Max characters shown for a timeline message before truncation.
const TIMELINE_MESSAGE_MAX: usize = 80;

/// Slash commands available in the console.
const SLASH_COMMANDS: &[&str] = &[
    "/help",
    "/login",
    "/register",
    "/logout",
    "/agents",
    "/use",
    "/clients",
    "/client",
    "/metrics",
    "/ask",
    "/image",
    "/panel",
    "/connect",
    "/quit",
    "/exit",
];

/// Rustyline helper for slash-command tab completion.
struct ReplHelper;

impl Completer for ReplHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];
        let matches: Vec<String> = SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| cmd.to_string())
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if !line.starts_with('/') || pos < line.len() {
            return None;
        }

        SLASH_COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Highlighter for ReplHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{hint}\x1b[0m"))
    }
}

impl Validator for ReplHelper {}
impl Helper for ReplHelper {}

/// Build a termimad skin with our color scheme.
fn make_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.set_headers_fg(termimad::crossterm::style::Color::Cyan);
    skin.bold.set_fg(termimad::crossterm::style::Color::White);
    skin.italic
        .set_fg(termimad::crossterm::style::Color::Magenta);
    skin.inline_code
        .set_fg(termimad::crossterm::style::Color::Green);
    skin
}

fn print_help() {
    // Bold white for section headers, bold cyan for commands, dim gray for descriptions
    let h = "\x1b[1m"; // bold (section headers)
    let c = "\x1b[1;36m"; // bold cyan (commands)
    let d = "\x1b[90m"; // dim gray (descriptions)
    let r = "\x1b[0m"; // reset

    println!();
    println!("  {h}siren-console{r}");
    println!();
    println!("  {h}Session{r}");
    println!("  {c}/login{r}             {d}sign in to the backend{r}");
    println!("  {c}/register{r}          {d}create an account{r}");
    println!("  {c}/logout{r}            {d}clear the session{r}");
    println!();
    println!("  {h}Dashboard{r}");
    println!("  {c}/agents{r}            {d}list your agents{r}");
    println!("  {c}/use <id>{r}          {d}select the working agent{r}");
    println!("  {c}/clients{r}           {d}list the agent's clients{r}");
    println!("  {c}/client <id>{r}       {d}select the working client{r}");
    println!("  {c}/metrics{r}           {d}performance report for the agent{r}");
    println!("  {c}/ask <guidance>{r}    {d}prompt the model over the conversation{r}");
    println!("  {c}/image <prompt>{r}    {d}generate images{r}");
    println!("  {c}/panel <name>{r}      {d}switch panel (idle|metrics|prompt|image){r}");
    println!();
    println!("  {h}Misc{r}");
    println!("  {c}/connect <url>{r}     {d}persist a different backend URL{r}");
    println!("  {c}/help{r}              {d}show this help{r}");
    println!("  {c}/quit{r} {c}/exit{r}        {d}leave the console{r}");
    println!();
}

fn truncate_for_preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}

/// Preview width for timeline messages, clamped to the terminal.
fn preview_width() -> usize {
    crossterm::terminal::size()
        .map(|(columns, _)| (columns as usize).saturating_sub(30))
        .unwrap_or(TIMELINE_MESSAGE_MAX)
        .clamp(20, TIMELINE_MESSAGE_MAX)
}

/// Interactive dashboard channel.
pub struct ReplChannel {
    config: Config,
    settings: Settings,
    store: Arc<SessionStore>,
    api: Arc<ApiClient>,
    guard: RouteGuard,
    metrics: MetricsEngine,
    composer: PromptComposer,
    skin: MadSkin,
    panel: Panel,
    selected_agent: Option<Agent>,
    selected_client: Option<ClientRecord>,
    /// Credentials carried over from a rejected registration to prefill the
    /// login form.
    prefill: Option<Credentials>,
}

impl ReplChannel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        settings: Settings,
        store: Arc<SessionStore>,
        api: Arc<ApiClient>,
        guard: RouteGuard,
        metrics: MetricsEngine,
        composer: PromptComposer,
    ) -> Self {
        let panel = settings.last_panel;
        Self {
            config,
            settings,
            store,
            api,
            guard,
            metrics,
            composer,
            skin: make_skin(),
            panel,
            selected_agent: None,
            selected_client: None,
            prefill: None,
        }
    }

    /// Run the console until the operator quits.
    pub async fn run(&mut self) -> Result<(), ChannelError> {
        let line_config = LineConfig::builder()
            .completion_type(CompletionType::List)
            .build();
        let mut editor: Editor<ReplHelper, FileHistory> =
            Editor::with_config(line_config).map_err(|e| ChannelError::Readline(e.to_string()))?;
        editor.set_helper(Some(ReplHelper));
        let history_path = crate::bootstrap::siren_home().join("history.txt");
        let _ = editor.load_history(&history_path);

        loop {
            match self.guard.state() {
                // Initial token read pending: render nothing, not the
                // login flow.
                GuardState::Loading => {
                    self.guard.resolve().await;
                }
                GuardState::Unauthenticated => {
                    if !self.auth_screen(&mut editor).await? {
                        break;
                    }
                }
                GuardState::Authenticated => {
                    if !self.dashboard(&mut editor).await? {
                        break;
                    }
                }
            }
        }

        let _ = editor.save_history(&history_path);
        Ok(())
    }

    fn readline(
        &self,
        editor: &mut Editor<ReplHelper, FileHistory>,
        prompt: &str,
    ) -> Result<Option<String>, ChannelError> {
        // rustyline is blocking; keep the runtime's other tasks (the guard
        // probe, in-flight fetches) running while we wait for input.
        let line = tokio::task::block_in_place(|| editor.readline(prompt));
        match line {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(ChannelError::Readline(e.to_string())),
        }
    }

    fn readline_with_initial(
        &self,
        editor: &mut Editor<ReplHelper, FileHistory>,
        prompt: &str,
        initial: &str,
    ) -> Result<Option<String>, ChannelError> {
        let line = tokio::task::block_in_place(|| editor.readline_with_initial(prompt, (initial, "")));
        match line {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(ChannelError::Readline(e.to_string())),
        }
    }

    async fn print_banner(&self) {
        if let Some(message) = self.store.banner().await {
            println!("\x1b[1;31m  ! {message}\x1b[0m");
        }
    }

    /// The unauthenticated flow. Returns `false` when the operator quits.
    async fn auth_screen(
        &mut self,
        editor: &mut Editor<ReplHelper, FileHistory>,
    ) -> Result<bool, ChannelError> {
        self.print_banner().await;
        let Some(line) = self.readline(editor, "siren (signed out)> ")? else {
            return Ok(false);
        };
        let line = line.trim().to_string();

        match line.split_whitespace().next().unwrap_or_default() {
            "" => {}
            "/login" => self.login_form(editor).await?,
            "/register" => self.register_form(editor).await?,
            "/connect" => self.connect(line.split_whitespace().nth(1)),
            "/help" => {
                println!();
                println!("  Sign in with /login or create an account with /register.");
                println!("  /connect <url> points the console at a different backend.");
                println!();
            }
            "/quit" | "/exit" => return Ok(false),
            other => println!("  Unknown command '{other}'. Try /login, /register, or /help."),
        }
        Ok(true)
    }

    async fn login_form(
        &mut self,
        editor: &mut Editor<ReplHelper, FileHistory>,
    ) -> Result<(), ChannelError> {
        // A fresh attempt supersedes whatever banner is still up.
        self.store.dismiss_banner().await;
        let prefill = self.prefill.take();
        let initial_user = prefill.as_ref().map(|c| c.username.as_str()).unwrap_or("");
        let initial_pass = prefill.as_ref().map(|c| c.password.as_str()).unwrap_or("");

        let Some(username) = self.readline_with_initial(editor, "  username: ", initial_user)?
        else {
            return Ok(());
        };
        let Some(password) = self.readline_with_initial(editor, "  password: ", initial_pass)?
        else {
            return Ok(());
        };

        let credentials = Credentials {
            username: username.trim().to_string(),
            password,
        };
        match self.store.login(&credentials).await {
            LoginOutcome::Authenticated => {
                println!("  Signed in.");
                // The terminal analogue of the post-login page reload:
                // re-evaluate the guard, which also dispatches the probe.
                self.guard.resolve().await;
            }
            LoginOutcome::Rejected => self.print_banner().await,
            LoginOutcome::Unreachable => println!("  Backend unreachable; try again."),
        }
        Ok(())
    }

    async fn register_form(
        &mut self,
        editor: &mut Editor<ReplHelper, FileHistory>,
    ) -> Result<(), ChannelError> {
        self.store.dismiss_banner().await;
        let Some(username) = self.readline(editor, "  username: ")? else {
            return Ok(());
        };
        let Some(email) = self.readline(editor, "  email: ")? else {
            return Ok(());
        };
        let Some(password) = self.readline(editor, "  password: ")? else {
            return Ok(());
        };
        let Some(confirm) = self.readline(editor, "  confirm password: ")? else {
            return Ok(());
        };

        let details = RegisterDetails {
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            password,
            confirm_password: confirm,
        };
        match self.store.register(&details).await {
            RegisterOutcome::Registered => {
                println!("  Registration successful! Sign in with /login.");
            }
            RegisterOutcome::Rejected { prefill } => {
                // Hand the attempted credentials to the login form. A UX
                // convenience, not a security boundary.
                self.prefill = Some(prefill);
                self.print_banner().await;
            }
            RegisterOutcome::Unreachable => println!("  Backend unreachable; try again."),
        }
        Ok(())
    }

    /// One dashboard interaction. Returns `false` when the operator quits.
    async fn dashboard(
        &mut self,
        editor: &mut Editor<ReplHelper, FileHistory>,
    ) -> Result<bool, ChannelError> {
        let prompt = format!("siren:{}> ", self.panel.as_str());
        let Some(line) = self.readline(editor, &prompt)? else {
            return Ok(false);
        };
        let line = line.trim().to_string();
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default().to_string();
        let rest = line[command.len()..].trim().to_string();

        match command.as_str() {
            "" => {}
            "/help" => print_help(),
            "/quit" | "/exit" => return Ok(false),
            "/logout" => {
                self.guard.logout().await;
                self.selected_agent = None;
                self.selected_client = None;
                println!("  Signed out.");
            }
            "/agents" => self.show_agents().await,
            "/use" => self.select_agent(rest.as_str()).await,
            "/clients" => self.show_clients().await,
            "/client" => self.select_client(rest.as_str()).await,
            "/metrics" => {
                self.switch_panel(Panel::Metrics);
                self.show_metrics().await;
            }
            "/ask" => {
                self.switch_panel(Panel::Prompt);
                self.ask(rest.as_str()).await;
            }
            "/image" => {
                self.switch_panel(Panel::Image);
                self.generate_image(rest.as_str()).await;
            }
            "/panel" => match Panel::parse(rest.as_str()) {
                Some(panel) => self.switch_panel(panel),
                None => println!("  Unknown panel '{rest}' (idle|metrics|prompt|image)."),
            },
            "/connect" => self.connect(parts.next()),
            other => println!("  Unknown command '{other}'. /help lists commands."),
        }

        // The probe may have revoked the session while we worked; the next
        // loop iteration falls back to the auth screen with the token gone.
        Ok(true)
    }

    fn switch_panel(&mut self, panel: Panel) {
        self.panel = panel;
        self.settings.last_panel = panel;
        if let Err(e) = self.settings.save(&default_settings_path()) {
            tracing::warn!("Failed to persist panel state: {}", e);
        }
    }

    fn connect(&self, url: Option<&str>) {
        let Some(url) = url else {
            println!("  Usage: /connect <url>");
            return;
        };
        match crate::config::validate_base_url(url, "SIREN_BASE_URL") {
            Ok(parsed) => {
                match crate::bootstrap::save_bootstrap_env(&[("SIREN_BASE_URL", parsed.as_str())]) {
                    Ok(()) => println!("  Saved. The new backend applies on next start."),
                    Err(e) => println!("  Could not persist the URL: {e}"),
                }
            }
            Err(e) => println!("  {e}"),
        }
    }

    async fn show_agents(&mut self) {
        let agents = self.api.agents().await;
        if agents.is_empty() {
            println!("  No agents visible (or the backend is unreachable).");
            return;
        }

        let mut table = String::from("|ID|Name|Clients|Status|\n|-:|:-|-:|:-|\n");
        for agent in &agents {
            let status = match agent.status {
                AgentStatus::Active => "active",
                AgentStatus::Inactive => "inactive",
            };
            table.push_str(&format!(
                "|{}|{}|{}|{}|\n",
                agent.id, agent.name, agent.client_count, status
            ));
        }
        self.skin.print_text(&table);
    }

    async fn select_agent(&mut self, arg: &str) {
        let Ok(id) = arg.parse::<u64>() else {
            println!("  Usage: /use <agent-id>");
            return;
        };
        let agents = self.api.agents().await;
        match agents.into_iter().find(|a| a.id == id) {
            Some(agent) => {
                println!("  Working agent: {} (#{})", agent.name, agent.id);
                self.selected_agent = Some(agent);
                // A different agent invalidates the working client and any
                // on-screen metrics.
                self.selected_client = None;
            }
            None => println!("  No agent with id {id}."),
        }
    }

    async fn show_clients(&mut self) {
        let Some(agent) = &self.selected_agent else {
            println!("  Select an agent first: /use <agent-id>");
            return;
        };
        let mut clients = self.api.clients(agent.id).await;
        if clients.is_empty() {
            println!("  No clients for {}.", agent.name);
            return;
        }
        // Importance-first ordering, the default sort of the client picker.
        clients.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut table = String::from("|ID|Name|Score|\n|-:|:-|-:|\n");
        for client in &clients {
            table.push_str(&format!(
                "|{}|{}|{:.1}|\n",
                client.id, client.name, client.score
            ));
        }
        self.skin.print_text(&table);
    }

    async fn select_client(&mut self, arg: &str) {
        let Some(agent) = &self.selected_agent else {
            println!("  Select an agent first: /use <agent-id>");
            return;
        };
        let Ok(id) = arg.parse::<u64>() else {
            println!("  Usage: /client <client-id>");
            return;
        };
        let clients = self.api.clients(agent.id).await;
        match clients.into_iter().find(|c| c.id == id) {
            Some(client) => {
                println!("  Working client: {} (#{})", client.name, client.id);
                self.selected_client = Some(client);
            }
            None => println!("  No client with id {id} for this agent."),
        }
    }

    async fn show_metrics(&mut self) {
        let Some(agent) = self.selected_agent.clone() else {
            println!("  Select an agent first: /use <agent-id>");
            return;
        };

        println!("  Crunching {}...", agent.name);
        match self.metrics.refresh(agent.id).await {
            Some(report) => self.render_report(&agent, &report),
            // A newer selection superseded this run; its report is already
            // on its way.
            None => tracing::debug!("Metrics run for agent {} superseded", agent.id),
        }
    }

    fn render_report(&self, agent: &Agent, report: &PerformanceReport) {
        let mut text = format!(
            "# {} performance\n\n**Total revenue:** ${}\n\n",
            agent.name, report.total_revenue
        );

        if report.clients.is_empty() {
            text.push_str("*No clients, nothing to aggregate.*\n");
            self.skin.print_text(&text);
            return;
        }

        text.push_str("## Clients\n\n|Name|Score|Symmetry|Avg gap (h)|Tx ratio|Status|\n|:-|-:|-:|-:|-:|:-|\n");
        for row in &report.clients {
            text.push_str(&format!(
                "|{}|{:.1}|{:.2}|{:.1}|{:.2}|{}|\n",
                row.name,
                row.score,
                row.symmetry_ratio,
                row.avg_gap_hours,
                row.tx_ratio,
                row.status.as_str()
            ));
        }

        if !report.weekday_gaps.is_empty() {
            text.push_str("\n## Message gaps by weekday\n\n|Day|Avg gap (h)|\n|:-|-:|\n");
            for point in &report.weekday_gaps {
                text.push_str(&format!("|{}|{:.1}|\n", point.day, point.avg_gap_hours));
            }
        }

        self.skin.print_text(&text);

        if !report.timeline.is_empty() {
            let width = preview_width();
            println!("  \x1b[1mMost active client timeline\x1b[0m");
            for entry in &report.timeline {
                let color = match entry.sender {
                    Sender::Agent => "\x1b[34m",
                    Sender::Client => "\x1b[32m",
                };
                println!(
                    "  \x1b[90m{}\x1b[0m {color}{}\x1b[0m [{}] {}",
                    entry.time.format("%m-%d %H:%M"),
                    entry.sender.as_str(),
                    entry.kind.as_str(),
                    truncate_for_preview(&entry.message, width)
                );
            }
            println!();
        }
    }

    async fn ask(&mut self, guidance: &str) {
        let selection = match (&self.selected_agent, &self.selected_client) {
            (Some(agent), Some(client)) => Some((agent.id, client.id)),
            _ => None,
        };

        match self.composer.ask(selection, guidance).await {
            Ok(reply) => {
                if let Some(thinking) = &reply.thinking {
                    println!("  \x1b[90m[thinking] {thinking}\x1b[0m");
                }
                self.skin.print_text(&reply.answer);
                if !reply.model.is_empty() {
                    println!("  \x1b[90m({})\x1b[0m", reply.model);
                }
            }
            Err(e) => println!("  {e}"),
        }
    }

    async fn generate_image(&mut self, prompt: &str) {
        if prompt.trim().is_empty() {
            println!("  Usage: /image <prompt>");
            return;
        }

        println!("  Generating...");
        match self.api.generate_image(prompt.trim()).await {
            Ok(batch) if batch.images.is_empty() => {
                println!("  The generator returned no images.");
            }
            Ok(batch) => {
                let dir = &self.config.images.output_dir;
                if let Err(e) = std::fs::create_dir_all(dir) {
                    println!("  Could not create {}: {e}", dir.display());
                    return;
                }
                let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
                let mut first = None;
                for (index, encoded) in batch.images.iter().enumerate() {
                    let bytes = match base64::engine::general_purpose::STANDARD.decode(encoded) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::warn!("Image {} did not decode: {}", index, e);
                            continue;
                        }
                    };
                    let path = dir.join(format!("sd-{stamp}-{index}.png"));
                    match std::fs::write(&path, bytes) {
                        Ok(()) => {
                            println!("  Saved {}", path.display());
                            first.get_or_insert(path);
                        }
                        Err(e) => println!("  Could not write {}: {e}", path.display()),
                    }
                }
                if let Some(path) = first
                    && let Err(e) = open::that(&path)
                {
                    tracing::debug!("Could not open image viewer: {}", e);
                }
            }
            Err(e) => println!("  {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_commands_complete_by_prefix() {
        let helper = ReplHelper;
        let history = FileHistory::new();
        let ctx = rustyline::Context::new(&history);
        let (start, matches) = helper.complete("/cl", 3, &ctx).unwrap();
        assert_eq!(start, 0);
        assert!(matches.contains(&"/clients".to_string()));
        assert!(matches.contains(&"/client".to_string()));
        assert!(!matches.contains(&"/metrics".to_string()));
    }

    #[test]
    fn hint_completes_the_unique_remainder() {
        let helper = ReplHelper;
        let history = FileHistory::new();
        let ctx = rustyline::Context::new(&history);
        assert_eq!(helper.hint("/met", 4, &ctx).as_deref(), Some("rics"));
        assert_eq!(helper.hint("hello", 5, &ctx), None);
    }

    #[test]
    fn previews_truncate_long_messages() {
        let long = "x".repeat(TIMELINE_MESSAGE_MAX + 10);
        let preview = truncate_for_preview(&long, TIMELINE_MESSAGE_MAX);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), TIMELINE_MESSAGE_MAX + 3);
        assert_eq!(truncate_for_preview("short", TIMELINE_MESSAGE_MAX), "short");
    }
}
