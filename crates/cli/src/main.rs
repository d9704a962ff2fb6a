use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;

use haven::api::ApiClient;
use haven::auth::{AuthClient, AuthRecord, AuthSession, AuthStore};
use haven::chat::{ChatOptions, ChatView, SendOutcome};
use haven::config::{self, Config};
use haven::message::{Message, MessageId, MessageIds, Role};
use haven::rag::{ChunkMode, ChunkingParams, ChunkingStrategy, DocumentConsole, DocumentDeletion};
use haven::session::{DeleteOutcome, Session, SessionDirectory, DELETE_SESSION_PROMPT};
use haven::tools::{build_parameters, ToolConsole, WellnessTool};

#[derive(Parser)]
#[command(name = "haven")]
#[command(about = "Haven CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the data directory and a default config file.
    Init {
        /// Config file path (default: HAVEN_CONFIG_PATH or ~/.haven/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Log in and store the returned token.
    Login {
        /// Config file path (default: HAVEN_CONFIG_PATH or ~/.haven/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        username: String,

        /// Prompted for when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account with an invite code and store the returned token.
    Register {
        /// Config file path (default: HAVEN_CONFIG_PATH or ~/.haven/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        username: String,

        #[arg(long)]
        invite_code: String,

        /// Prompted for when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored login.
    Logout {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Show the stored login.
    Whoami {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Chat with the assistant (interactive). Type /help inside for commands.
    Chat {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Continue this session instead of the most recent one.
        #[arg(long, value_name = "ID")]
        session: Option<String>,

        /// Wait for whole replies instead of streaming them.
        #[arg(long)]
        no_stream: bool,
    },

    /// List, create, delete, and inspect chat sessions.
    Sessions {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        #[command(subcommand)]
        action: Option<SessionAction>,
    },

    /// Document console: upload, list, preview, delete, test chunking, search.
    Docs {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        #[command(subcommand)]
        action: DocAction,
    },

    /// List or run the backend's agent tools.
    Tools {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        #[command(subcommand)]
        action: ToolAction,
    },

    /// Run a wellness tool (omit the tool to list them).
    Wellness {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Tool id, e.g. coping_strategies
        tool: Option<WellnessTool>,

        /// Free text passed to the tool.
        input: Vec<String>,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// List sessions, newest first (default).
    List,
    /// Create a session.
    New { title: String },
    /// Delete a session.
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
    /// Print a session's messages.
    History { id: String },
}

#[derive(Subcommand)]
enum DocAction {
    /// List documents.
    List,
    /// Upload files one by one with the given chunking parameters.
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        chunking: ChunkArgs,
    },
    /// Delete a document.
    Delete {
        id: String,
        #[arg(long, short)]
        yes: bool,
    },
    /// Show a document's chunks.
    Preview { id: String },
    /// Chunk text without storing it.
    TestChunking {
        text: String,
        #[command(flatten)]
        chunking: ChunkArgs,
    },
    /// Search stored chunks.
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<u32>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Search within one category.
    SearchCategory {
        category: String,
        #[arg(long)]
        top_k: Option<u32>,
    },
    /// List categories known to the backend.
    Categories,
    /// Show store statistics.
    Stats,
    /// Show chunking strategies and their defaults.
    Strategies {
        /// Ask the backend for its catalog instead.
        #[arg(long)]
        remote: bool,
    },
}

#[derive(Args)]
struct ChunkArgs {
    /// fixed_length, semantic, session, hierarchical, adaptive
    #[arg(long)]
    strategy: Option<ChunkingStrategy>,
    /// Overrides the strategy's default size.
    #[arg(long)]
    chunk_size: Option<u32>,
    #[arg(long)]
    overlap: Option<u32>,
    /// chars, words, sentences, paragraphs
    #[arg(long)]
    mode: Option<ChunkMode>,
    /// Comma-separated keywords.
    #[arg(long)]
    keywords: Option<String>,
}

#[derive(Subcommand)]
enum ToolAction {
    /// List tools and their parameters.
    List,
    /// Run a tool with name=value parameters.
    Run { name: String, params: Vec<String> },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("haven {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config),
        Some(Commands::Login {
            config,
            username,
            password,
        }) => run_login(config, username, password, None).await,
        Some(Commands::Register {
            config,
            username,
            invite_code,
            password,
        }) => run_login(config, username, password, Some(invite_code)).await,
        Some(Commands::Logout { config }) => run_logout(config),
        Some(Commands::Whoami { config }) => run_whoami(config),
        Some(Commands::Chat {
            config,
            session,
            no_stream,
        }) => run_chat(config, session, no_stream).await,
        Some(Commands::Sessions { config, action }) => {
            run_sessions(config, action.unwrap_or(SessionAction::List)).await
        }
        Some(Commands::Docs { config, action }) => run_docs(config, action).await,
        Some(Commands::Tools { config, action }) => run_tools(config, action).await,
        Some(Commands::Wellness {
            config,
            tool,
            input,
        }) => run_wellness(config, tool, input.join(" ")).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Loaded config plus what every command derives from it.
struct Context {
    config: Config,
    store: AuthStore,
    base_url: String,
}

impl Context {
    fn load(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let (config, path) = config::load_config(config_path)?;
        let store = AuthStore::new(config::resolve_auth_path(&config, &path));
        let base_url = config::resolve_api_url(&config);
        log::debug!("backend {} (config {})", base_url, path.display());
        Ok(Self {
            config,
            store,
            base_url,
        })
    }

    /// Client carrying the stored token when there is one.
    fn api(&self) -> anyhow::Result<ApiClient> {
        let token = self.store.load()?.map(|r| r.token);
        Ok(ApiClient::new(Some(self.base_url.clone())).with_token(token))
    }

    fn auth(&self) -> anyhow::Result<(ApiClient, AuthSession)> {
        let record = self
            .store
            .load()?
            .ok_or_else(|| anyhow::anyhow!("not logged in; run `haven login` first"))?;
        let api = ApiClient::new(Some(self.base_url.clone())).with_token(Some(record.token.clone()));
        Ok((api, AuthSession::new(record, self.config.api.agent_type.clone())))
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let dir = haven::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_login(
    config_path: Option<PathBuf>,
    username: String,
    password: Option<String>,
    invite_code: Option<String>,
) -> anyhow::Result<()> {
    let ctx = Context::load(config_path)?;
    let password = match password {
        Some(p) => p,
        None => prompt_line("password: ")?,
    };
    let client = AuthClient::new(ApiClient::new(Some(ctx.base_url.clone())));
    let record: AuthRecord = match invite_code {
        Some(code) => client.register(&username, &password, &code).await?,
        None => client.login(&username, &password).await?,
    };
    ctx.store.save(&record)?;
    println!("logged in as {} (user {})", record.username, record.user_id);
    Ok(())
}

fn run_logout(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = Context::load(config_path)?;
    ctx.store.clear()?;
    println!("logged out");
    Ok(())
}

fn run_whoami(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = Context::load(config_path)?;
    match ctx.store.load()? {
        Some(r) => println!("{} (user {})", r.username, r.user_id),
        None => println!("not logged in"),
    }
    Ok(())
}

const CHAT_HELP: &str = "\
/sessions          list sessions
/switch <id>       switch to a session and load its history
/new <title>       create a session and switch to it
/delete <id>       delete a session
/title <title>     rename the current (unsaved) session
/history           reload history for the current session
/stream on|off     toggle streamed replies
/exit              quit
Ctrl-C while a reply is arriving stops it; at the prompt it quits.";

async fn run_chat(
    config_path: Option<PathBuf>,
    session: Option<String>,
    no_stream: bool,
) -> anyhow::Result<()> {
    let ctx = Context::load(config_path)?;
    let (api, auth) = ctx.auth()?;
    let mut options = ChatOptions::from(&ctx.config.chat);
    if no_stream {
        options.streaming = false;
    }
    let mut view = ChatView::new(api, auth, options);
    match session {
        Some(id) => view.switch_session(&id).await,
        None => view.initialize().await,
    }
    println!(
        "session: {} ({})  /help for commands",
        view.current().title,
        view.current().id
    );
    for m in view.messages() {
        print_message(m);
    }

    let mut lines = spawn_stdin_lines();
    loop {
        let Some(line) = next_input(&mut lines, "> ").await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if let Some(command) = input.strip_prefix('/') {
            let (name, arg) = command
                .split_once(char::is_whitespace)
                .map(|(n, a)| (n, a.trim()))
                .unwrap_or((command, ""));
            match name {
                "exit" | "quit" => break,
                "help" => println!("{}", CHAT_HELP),
                "sessions" => {
                    view.directory_mut().refresh_if_stale().await;
                    print_sessions(view.directory().sessions(), Some(view.current().id.as_str()));
                }
                "switch" if !arg.is_empty() => {
                    view.switch_session(arg).await;
                    println!("switched to {}", view.current().title);
                    for m in view.messages() {
                        print_message(m);
                    }
                }
                "new" if !arg.is_empty() => match view.create_session(arg).await {
                    Ok(Some(s)) => println!("created {} ({})", s.display_title(), s.session_id),
                    Ok(None) => {}
                    Err(e) => eprintln!("failed to create session: {}", e),
                },
                "delete" if !arg.is_empty() => {
                    let prompt = format!("{} [y/N] ", DELETE_SESSION_PROMPT);
                    let confirmed = next_input(&mut lines, &prompt)
                        .await?
                        .is_some_and(|a| is_yes(&a));
                    match view.delete_session(arg, |_| confirmed).await {
                        DeleteOutcome::Deleted => println!("deleted {}", arg),
                        DeleteOutcome::Declined => {}
                        DeleteOutcome::Failed => eprintln!("failed to delete {}", arg),
                    }
                }
                "title" if !arg.is_empty() => view.set_title(arg),
                "history" => {
                    let id = view.current().id.clone();
                    view.load_history(&id).await;
                    for m in view.messages() {
                        print_message(m);
                    }
                }
                "stream" => {
                    view.set_streaming(arg != "off");
                    println!("streaming {}", if view.streaming() { "on" } else { "off" });
                }
                _ => println!("{}", CHAT_HELP),
            }
            continue;
        }

        let cancel = view.cancel_handle();
        let mut printer = ReplyPrinter::default();
        let outcome = {
            let mut on_update = |m: &Message| printer.update(m);
            let send = view.send_message(input, &mut on_update);
            tokio::pin!(send);
            tokio::select! {
                outcome = &mut send => outcome,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    send.await
                }
            }
        };
        printer.finish();
        if outcome == SendOutcome::Cancelled {
            println!("(stopped)");
        }
    }
    Ok(())
}

/// Prints streamed replies incrementally: each update carries the full text so far, so
/// only the new suffix is written.
#[derive(Default)]
struct ReplyPrinter {
    current: Option<MessageId>,
    printed: String,
}

impl ReplyPrinter {
    fn update(&mut self, m: &Message) {
        if m.role == Role::User {
            return;
        }
        if self.current != Some(m.id) {
            self.current = Some(m.id);
            self.printed.clear();
            print!("< ");
        }
        match m.content.strip_prefix(self.printed.as_str()) {
            Some(rest) => print!("{}", rest),
            None => print!("\n< {}", m.content),
        }
        self.printed = m.content.clone();
        let _ = io::stdout().flush();
    }

    fn finish(&self) {
        if self.current.is_some() {
            println!();
        }
    }
}

async fn run_sessions(config_path: Option<PathBuf>, action: SessionAction) -> anyhow::Result<()> {
    let ctx = Context::load(config_path)?;
    let (api, auth) = ctx.auth()?;
    let mut directory = SessionDirectory::new(api.clone(), auth.clone());
    match action {
        SessionAction::List => {
            let sessions = directory.refresh().await?;
            print_sessions(sessions, None);
        }
        SessionAction::New { title } => {
            let title = title.trim();
            if title.is_empty() {
                anyhow::bail!("session title must not be empty");
            }
            let s = directory.create(title).await?;
            println!("{}", s.session_id);
        }
        SessionAction::Delete { id, yes } => {
            match directory.delete(&id, |p| yes || ask_yes_no(p)).await {
                DeleteOutcome::Deleted => println!("deleted {}", id),
                DeleteOutcome::Declined => println!("kept {}", id),
                DeleteOutcome::Failed => anyhow::bail!("failed to delete session {}", id),
            }
        }
        SessionAction::History { id } => {
            let entries = haven::history::fetch_history(&api, &auth, &id).await?;
            let messages = haven::history::to_messages(entries, &mut MessageIds::default());
            if messages.is_empty() {
                println!("no messages");
            }
            for m in &messages {
                print_message(m);
            }
        }
    }
    Ok(())
}

async fn run_docs(config_path: Option<PathBuf>, action: DocAction) -> anyhow::Result<()> {
    let ctx = Context::load(config_path)?;
    let mut console = DocumentConsole::new(ctx.api()?, ChunkingParams::for_strategy(ctx.config.rag.strategy));
    if let Some(k) = &ctx.config.rag.custom_keywords {
        console.params_mut().custom_keywords = k.clone();
    }
    match action {
        DocAction::List => {
            let docs = console.refresh().await?;
            if docs.is_empty() {
                println!("no documents");
            }
            for d in docs {
                println!(
                    "{}  {}  [{}]  {}  {} chunks  {}  {}",
                    d.id,
                    d.name,
                    d.chunking_strategy,
                    d.status.as_str(),
                    d.chunk_count,
                    d.categories.join(","),
                    d.uploaded_at.as_deref().unwrap_or("")
                );
            }
        }
        DocAction::Upload { files, chunking } => {
            apply_chunk_args(console.params_mut(), chunking);
            let report = console.upload(&files).await;
            for name in &report.uploaded {
                println!("uploaded {}", name);
            }
            for (name, err) in &report.failed {
                eprintln!("failed {}: {}", name, err);
            }
            println!("{} documents in store", console.documents().len());
            if !report.is_complete() {
                anyhow::bail!("{} of {} uploads failed", report.failed.len(), files.len());
            }
        }
        DocAction::Delete { id, yes } => {
            if let Err(e) = console.refresh().await {
                log::warn!("could not load documents before delete: {}", e);
            }
            match console.delete(&id, |p| yes || ask_yes_no(p)).await {
                DocumentDeletion::Deleted => println!("deleted {}", id),
                DocumentDeletion::RemovedLocally => {
                    println!("backend did not confirm; {} removed from the list", id)
                }
                DocumentDeletion::Declined => println!("kept {}", id),
            }
        }
        DocAction::Preview { id } => {
            let chunks = console.preview(&id).await?;
            for c in &chunks {
                println!(
                    "--- chunk {} ({} chars, {} words)",
                    c.chunk_id, c.length, c.word_count
                );
                println!("{}", c.text);
            }
            println!("{} chunks", chunks.len());
        }
        DocAction::TestChunking { text, chunking } => {
            apply_chunk_args(console.params_mut(), chunking);
            let report = console.test_chunking(&text).await?;
            for c in &report.chunks {
                println!(
                    "--- {} [{}] {}..{}",
                    c.id,
                    c.chunk_type.as_deref().unwrap_or("-"),
                    c.start_index.unwrap_or(0),
                    c.end_index.unwrap_or(0)
                );
                println!("{}", c.text);
            }
            let s = &report.statistics;
            println!(
                "{} chunks with {}: avg {:.1}, min {}, max {}",
                report.chunk_count,
                report.chunking_strategy,
                s.avg_chunk_length,
                s.min_chunk_length,
                s.max_chunk_length
            );
        }
        DocAction::Search {
            query,
            top_k,
            category,
        } => {
            let hits = console.search_with(&query, top_k, category.as_deref()).await?;
            print_hits(&hits);
        }
        DocAction::SearchCategory { category, top_k } => {
            let hits = console.search_by_category(&category, top_k).await?;
            print_hits(&hits);
        }
        DocAction::Categories => print_json(&console.categories().await?)?,
        DocAction::Stats => print_json(&console.stats().await?)?,
        DocAction::Strategies { remote } => {
            if remote {
                print_json(&console.strategy_catalog().await?)?;
            } else {
                for s in ChunkingStrategy::ALL {
                    let (size, overlap, mode) = s.defaults();
                    println!(
                        "{:<13} {:>4}/{:<3} {:<10} {}{}",
                        s.as_str(),
                        size,
                        overlap,
                        mode.as_str(),
                        s.description(),
                        if s.recommended() { " (recommended)" } else { "" }
                    );
                }
            }
        }
    }
    Ok(())
}

fn apply_chunk_args(params: &mut ChunkingParams, args: ChunkArgs) {
    if let Some(s) = args.strategy {
        params.select_strategy(s);
    }
    if let Some(n) = args.chunk_size {
        params.chunk_size = n;
    }
    if let Some(n) = args.overlap {
        params.overlap = n;
    }
    if let Some(m) = args.mode {
        params.mode = m;
    }
    if let Some(k) = args.keywords {
        params.custom_keywords = k;
    }
}

async fn run_tools(config_path: Option<PathBuf>, action: ToolAction) -> anyhow::Result<()> {
    let ctx = Context::load(config_path)?;
    let console = ToolConsole::new(ctx.api()?);
    let tools = console.list().await?;
    match action {
        ToolAction::List => {
            for t in &tools {
                println!("{}  {}", t.name, t.description);
                for name in t.parameter_names() {
                    let schema = t.parameter(name).unwrap_or_default();
                    println!(
                        "    {}{}: {}{}",
                        name,
                        if t.is_required(name) { "*" } else { "" },
                        schema.kind,
                        schema
                            .choices
                            .map(|c| format!(" ({})", c.join("|")))
                            .unwrap_or_default()
                    );
                }
            }
        }
        ToolAction::Run { name, params } => {
            let tool = tools
                .iter()
                .find(|t| t.name == name)
                .ok_or_else(|| anyhow::anyhow!("unknown tool: {}", name))?;
            let raw = params
                .iter()
                .map(|p| {
                    p.split_once('=')
                        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                        .ok_or_else(|| anyhow::anyhow!("expected name=value, got {:?}", p))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let parameters = build_parameters(tool, &raw)?;
            print_json(&console.execute(&tool.name, &parameters).await)?;
        }
    }
    Ok(())
}

async fn run_wellness(
    config_path: Option<PathBuf>,
    tool: Option<WellnessTool>,
    input: String,
) -> anyhow::Result<()> {
    let Some(tool) = tool else {
        for t in WellnessTool::ALL {
            println!("{:<20} {}  [{}]", t.id(), t.description(), t.input_hint());
        }
        return Ok(());
    };
    let ctx = Context::load(config_path)?;
    let data = tool.run(&ctx.api()?, &input).await?;
    print_json(&data)
}

fn print_message(m: &Message) {
    let who = match m.role {
        Role::User => ">",
        Role::Assistant => "<",
    };
    println!("{} {}", who, m.content);
}

fn print_sessions(sessions: &[Session], current: Option<&str>) {
    if sessions.is_empty() {
        println!("no sessions");
    }
    for s in sessions {
        let marker = if Some(s.session_id.as_str()) == current { "*" } else { " " };
        println!(
            "{} {}  {}  {}",
            marker,
            s.session_id,
            s.effective_timestamp().format("%Y-%m-%d %H:%M"),
            s.display_title()
        );
    }
}

fn print_hits(hits: &[haven::rag::SearchHit]) {
    if hits.is_empty() {
        println!("no results");
    }
    for h in hits {
        println!(
            "--- {} similarity {:.3}",
            h.id.as_deref().unwrap_or("-"),
            h.similarity.unwrap_or(0.0)
        );
        println!("{}", h.text);
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print `prompt` and read one line; None at end of input.
fn read_prompt(prompt: &str) -> io::Result<Option<String>> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", prompt)?;
    stdout.flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Stdin lines read on a plain thread, so a pending read never holds up runtime shutdown.
fn spawn_stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Print `prompt` and wait for the next line. None at end of input or on Ctrl-C.
async fn next_input(
    lines: &mut mpsc::UnboundedReceiver<String>,
    prompt: &str,
) -> io::Result<Option<String>> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", prompt)?;
    stdout.flush()?;
    tokio::select! {
        line = lines.recv() => Ok(line.map(|l| l.trim_end_matches('\r').to_string())),
        _ = tokio::signal::ctrl_c() => {
            println!();
            Ok(None)
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    read_prompt(prompt)?.ok_or_else(|| anyhow::anyhow!("end of input"))
}

fn ask_yes_no(prompt: &str) -> bool {
    match prompt_line(&format!("{} [y/N] ", prompt)) {
        Ok(answer) => is_yes(&answer),
        Err(_) => false,
    }
}
