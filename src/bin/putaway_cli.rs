use std::{
    fs::File,
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use pharmacy_putaway::{
    auth::{FileTokenStore, MemoryTokenStore, StoredSession, TokenStore},
    config::{self, AppConfig},
    events,
    logging::{self, LoggerConfig},
    models::{LineItem, NewLocation, PendingWorkItem, Priority, PutAwayFilter, QueueKind},
    navigation::Route,
    AppContext, PutAwaySession, ServiceError,
};
use serde::Serialize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize()?;

    match cli.command {
        Commands::Auth(command) => handle_auth_command(&context, command, cli.json)?,
        Commands::Queue(command) => handle_queue_command(&context, command, cli.json).await?,
        Commands::Locations(command) => {
            handle_locations_command(&context, command, cli.json).await?
        }
        Commands::Putaway(command) => handle_putaway_command(&context, command, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "putaway",
    about = "Assign storage locations to received stock and make it live",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Auth(AuthCommands),
    #[command(subcommand)]
    Queue(QueueCommands),
    #[command(subcommand)]
    Locations(LocationCommands),
    #[command(subcommand)]
    Putaway(PutawayCommands),
}

#[derive(Subcommand)]
enum AuthCommands {
    Login(AuthLoginArgs),
    Logout,
    Whoami,
}

#[derive(Args)]
struct AuthLoginArgs {
    #[arg(long, help = "Bearer token issued by the inventory backend")]
    token: String,
    #[arg(long, help = "Operator name recorded alongside the token")]
    operator: Option<String>,
}

#[derive(Subcommand)]
enum QueueCommands {
    List(QueueListArgs),
    Show(QueueShowArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Purchase,
    SalesReturn,
    StockAdjustment,
}

impl From<KindArg> for QueueKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Purchase => QueueKind::PurchaseReceipt,
            KindArg::SalesReturn => QueueKind::SalesReturn,
            KindArg::StockAdjustment => QueueKind::StockAdjustment,
        }
    }
}

#[derive(Args, Default)]
struct FilterArgs {
    #[arg(long, help = "Free-text search")]
    search: Option<String>,
    #[arg(long)]
    supplier: Option<String>,
    #[arg(long)]
    invoice: Option<String>,
    #[arg(long)]
    sku: Option<String>,
    #[arg(long)]
    product: Option<String>,
    #[arg(long)]
    batch: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    manufacturer: Option<String>,
    #[arg(long, help = "Low, Normal, High or Urgent")]
    priority: Option<Priority>,
    #[arg(long)]
    received_by: Option<String>,
    #[arg(long, help = "YYYY-MM-DD")]
    start_date: Option<NaiveDate>,
    #[arg(long, help = "YYYY-MM-DD")]
    end_date: Option<NaiveDate>,
    #[arg(long, help = "YYYY-MM-DD")]
    expiry_before: Option<NaiveDate>,
}

impl FilterArgs {
    fn into_filter(self, kind: QueueKind) -> PutAwayFilter {
        PutAwayFilter {
            put_away_type: kind,
            search: self.search,
            supplier_name: self.supplier,
            invoice_number: self.invoice,
            sku: self.sku,
            product_name: self.product,
            batch_number: self.batch,
            category: self.category,
            manufacturer: self.manufacturer,
            priority: self.priority,
            received_by: self.received_by,
            start_date: self.start_date,
            end_date: self.end_date,
            expiry_before: self.expiry_before,
        }
    }
}

#[derive(Args)]
struct QueueListArgs {
    #[arg(long = "type", value_enum, default_value = "purchase")]
    kind: KindArg,
    #[command(flatten)]
    filter: FilterArgs,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    page_size: Option<u32>,
}

#[derive(Args)]
struct QueueShowArgs {
    #[arg(long = "type", value_enum, default_value = "purchase")]
    kind: KindArg,
    #[arg(long, help = "Backend id of the receipt, return or adjustment log")]
    id: String,
}

#[derive(Subcommand)]
enum LocationCommands {
    Search(LocationSearchArgs),
    Create(LocationCreateArgs),
}

#[derive(Args)]
struct LocationSearchArgs {
    query: String,
}

#[derive(Args)]
struct LocationCreateArgs {
    #[arg(long)]
    aisle: String,
    #[arg(long)]
    rack: String,
    #[arg(long)]
    shelf: String,
    #[arg(long)]
    bin: String,
    #[arg(long)]
    category: String,
}

#[derive(Subcommand)]
enum PutawayCommands {
    Commit(CommitArgs),
    BulkUpload(BulkUploadArgs),
}

#[derive(Args)]
struct CommitArgs {
    #[arg(long = "type", value_enum, default_value = "purchase")]
    kind: KindArg,
    #[arg(long)]
    id: String,
    #[arg(long, help = "Location code for every line without one")]
    rack: Option<String>,
    #[arg(long = "assign", value_name = "INDEX=CODE", help = "Location code for one line")]
    assignments: Vec<String>,
    #[arg(long, help = "Line index that receives a newly created location")]
    create_for: Option<usize>,
    #[arg(long, requires = "create_for")]
    aisle: Option<String>,
    #[arg(long, requires = "create_for")]
    rack_no: Option<String>,
    #[arg(long, requires = "create_for")]
    shelf: Option<String>,
    #[arg(long, requires = "create_for")]
    bin: Option<String>,
    #[arg(long, requires = "create_for")]
    category: Option<String>,
    #[arg(long, help = "Spreadsheet with Medicine Name/SKU, Quantity and Rack columns")]
    csv: Option<PathBuf>,
    #[arg(long, action = ArgAction::SetTrue, help = "Skip the confirmation prompt")]
    yes: bool,
}

#[derive(Args)]
struct BulkUploadArgs {
    #[arg(long, help = "Spreadsheet with Invoice Number, Medicine Name/SKU, Rack and Quantity columns")]
    csv: PathBuf,
}

struct CliContext {
    session_store: Option<FileTokenStore>,
    app: AppContext,
}

impl CliContext {
    fn initialize() -> Result<Self> {
        let config: AppConfig =
            config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let session_store = config.session_path().map(FileTokenStore::new);
        let tokens: Arc<dyn TokenStore> = match &session_store {
            Some(store) => Arc::new(store.clone()),
            None => Arc::new(MemoryTokenStore::new()),
        };

        let (event_sender, event_rx) = events::channel(config.event_channel_capacity);
        tokio::spawn(events::process_events(event_rx));

        let logger = logging::setup_logger(LoggerConfig::with_color(config.audit_color));
        let app = AppContext::new(config, tokens, Some(event_sender), logger)
            .context("failed to initialize the API client")?;

        Ok(Self {
            session_store,
            app,
        })
    }

    fn session_store(&self) -> Result<&FileTokenStore> {
        self.session_store.as_ref().ok_or_else(|| {
            anyhow!(
                "no session file location; set session_file in config or {}",
                config::CLI_HOME_ENV
            )
        })
    }

    /// Turns a backend error into CLI output, pointing at login when the token was refused.
    fn fail(&self, err: ServiceError, action: &str) -> anyhow::Error {
        if self.app.navigator.current() == Route::Login {
            return anyhow!("{}: {}. Run `putaway auth login`.", action, err.alert_message());
        }
        anyhow!("{}: {}", action, err.alert_message())
    }
}

fn handle_auth_command(context: &CliContext, command: AuthCommands, json: bool) -> Result<()> {
    let store = context.session_store()?;
    match command {
        AuthCommands::Login(args) => {
            let session = StoredSession {
                access_token: args.token.trim().to_string(),
                operator: args.operator,
                saved_at: Utc::now(),
            };
            if session.access_token.is_empty() {
                bail!("token must not be empty");
            }
            store
                .save_session(&session)
                .context("failed to save session")?;
            if json {
                print_json(&SessionView::from(&session))?;
            } else {
                println!("Session saved to: {}", store.path().display());
            }
        }
        AuthCommands::Logout => {
            store.clear().context("failed to clear session")?;
            if !json {
                println!("Signed out");
            }
        }
        AuthCommands::Whoami => {
            let session = store.read_session().context("failed to read session")?;
            match (session, json) {
                (Some(session), true) => print_json(&SessionView::from(&session))?,
                (Some(session), false) => {
                    let view = SessionView::from(&session);
                    println!(
                        "Operator: {}",
                        view.operator.as_deref().unwrap_or("(not recorded)")
                    );
                    println!("Token: {}", view.token);
                    println!("Saved at: {}", view.saved_at);
                }
                (None, _) => bail!("not signed in; run `putaway auth login --token <TOKEN>`"),
            }
        }
    }
    Ok(())
}

async fn handle_queue_command(context: &CliContext, command: QueueCommands, json: bool) -> Result<()> {
    let mut session = context.app.session();
    match command {
        QueueCommands::List(args) => {
            if let Some(size) = args.page_size {
                let mut app = context.app.clone();
                app.config.default_page_size = size;
                session = app.session();
            }
            let kind = QueueKind::from(args.kind);
            session
                .set_filter(args.filter.into_filter(kind))
                .await
                .map_err(|e| context.fail(e, "failed to load the pending queue"))?;
            if args.page > 1 {
                session
                    .go_to_page(args.page)
                    .await
                    .map_err(|e| context.fail(e, "failed to load the pending queue"))?;
            }

            let page = session.pending();
            let rows: Vec<QueueRow> = page.items.iter().map(QueueRow::from).collect();
            if json {
                print_json(&QueueView {
                    kind,
                    page: page.page,
                    total_pages: page.total_pages,
                    total_records: page.total_records,
                    items: rows,
                })?;
            } else if rows.is_empty() {
                println!("Nothing is waiting for put-away in {}", kind);
            } else {
                println!(
                    "{} (page {} of {}, {} pending)",
                    kind,
                    page.page,
                    page.total_pages.max(1),
                    page.total_records
                );
                for row in &rows {
                    render_queue_row(row);
                }
            }
        }
        QueueCommands::Show(args) => {
            select_item(context, &mut session, args.kind.into(), &args.id).await?;
            let lines = session.lines();
            if json {
                print_json(&lines)?;
            } else {
                for (index, line) in lines.iter().enumerate() {
                    render_line(index, line);
                }
            }
        }
    }
    Ok(())
}

async fn handle_locations_command(
    context: &CliContext,
    command: LocationCommands,
    json: bool,
) -> Result<()> {
    match command {
        LocationCommands::Search(args) => {
            let mut directory = context.app.location_directory();
            let hits = directory
                .search(&args.query)
                .await
                .map_err(|e| context.fail(e, "failed to search locations"))?;
            if json {
                print_json(&hits)?;
            } else if hits.is_empty() {
                println!("No location matches '{}'", args.query);
            } else {
                for location in &hits {
                    println!(
                        "- {} • {}",
                        location.location_code,
                        location.category.as_deref().unwrap_or("uncategorised")
                    );
                }
            }
        }
        LocationCommands::Create(args) => {
            let mut directory = context.app.location_directory();
            let form = NewLocation::new(args.aisle, args.rack, args.shelf, args.bin, args.category);
            let location = directory
                .create(&form)
                .await
                .map_err(|e| context.fail(e, "failed to create location"))?;
            if json {
                print_json(&location)?;
            } else {
                println!("Created location {}", location.location_code);
            }
        }
    }
    Ok(())
}

async fn handle_putaway_command(
    context: &CliContext,
    command: PutawayCommands,
    json: bool,
) -> Result<()> {
    match command {
        PutawayCommands::Commit(args) => handle_commit(context, args, json).await,
        PutawayCommands::BulkUpload(args) => {
            let file = File::open(&args.csv)
                .with_context(|| format!("failed to open {}", args.csv.display()))?;
            let mut session = context.app.session();
            let outcome = session
                .bulk_upload(file)
                .await
                .map_err(|e| context.fail(e, "bulk upload failed"))?;

            if json {
                print_json(&outcome.receipt)?;
            } else {
                println!(
                    "Uploaded: {} line(s) updated, {} row(s) skipped",
                    outcome.receipt.updated.unwrap_or_default(),
                    outcome.skipped
                );
                for error in &outcome.receipt.errors {
                    eprintln!("  ! {}", error);
                }
            }
            if let Some(err) = outcome.refresh_error {
                eprintln!("warning: could not reload the queue: {}", err.alert_message());
            }
            Ok(())
        }
    }
}

async fn handle_commit(context: &CliContext, args: CommitArgs, json: bool) -> Result<()> {
    let mut session = context.app.session();
    select_item(context, &mut session, args.kind.into(), &args.id).await?;

    if let Some(path) = &args.csv {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let report = session
            .apply_bulk_csv(file)
            .await
            .map_err(|e| context.fail(e, "failed to apply spreadsheet"))?;
        if !json {
            println!(
                "Spreadsheet: {} row(s), {} matched, {} unmatched",
                report.rows, report.matched, report.unmatched
            );
        }
    }

    for assignment in &args.assignments {
        let (index, code) = parse_assignment(assignment)?;
        session
            .assign_location(index, code)
            .await
            .map_err(|e| context.fail(e, "failed to assign location"))?;
    }

    if let Some(index) = args.create_for {
        session
            .begin_location_create(index)
            .map_err(|e| context.fail(e, "failed to start location creation"))?;
        let form = NewLocation::new(
            args.aisle.unwrap_or_default(),
            args.rack_no.unwrap_or_default(),
            args.shelf.unwrap_or_default(),
            args.bin.unwrap_or_default(),
            args.category.unwrap_or_default(),
        );
        let location = session
            .create_location(&form)
            .await
            .map_err(|e| context.fail(e, "failed to create location"))?;
        if !json {
            println!("Created location {} for line {}", location.location_code, index);
        }
    }

    if let Some(code) = &args.rack {
        session
            .assign_all_unassigned(code)
            .await
            .map_err(|e| context.fail(e, "failed to assign location"))?;
    }

    let plan = session
        .commit_plan()
        .map_err(|e| context.fail(e, "nothing to commit"))?;
    if json && !args.yes {
        print_json(&plan)?;
    } else if !json {
        println!(
            "{} {} ({}): {} line(s)",
            plan.kind, plan.reference, plan.id, plan.line_count
        );
        for (index, line) in session.lines().iter().enumerate() {
            render_line(index, line);
        }
        if !plan.is_fully_assigned() {
            eprintln!(
                "warning: line(s) {:?} have no location; the backend will refuse them",
                plan.unassigned
            );
        }
    }

    if !args.yes && !confirm("Make these items live?")? {
        println!("Aborted; nothing was sent");
        return Ok(());
    }

    let outcome = session
        .commit()
        .await
        .map_err(|e| context.fail(e, "put-away failed"))?;

    if json {
        print_json(&CommitView {
            kind: outcome.kind,
            id: &outcome.id,
            message: outcome.message.as_deref(),
        })?;
    } else {
        println!(
            "{}",
            outcome
                .message
                .as_deref()
                .unwrap_or("Put-away completed; stock is now live")
        );
        println!("View stock with your inventory list ({})", Route::InventoryList);
    }
    if let Some(err) = outcome.refresh_error {
        eprintln!("warning: could not reload the queue: {}", err.alert_message());
    }
    session.open_inventory();
    Ok(())
}

/// Loads pages of `kind` until the entry with `id` is found and selects it.
async fn select_item(
    context: &CliContext,
    session: &mut PutAwaySession,
    kind: QueueKind,
    id: &str,
) -> Result<()> {
    session
        .set_queue_kind(kind)
        .await
        .map_err(|e| context.fail(e, "failed to load the pending queue"))?;

    loop {
        if session.pending().items.iter().any(|item| item.id() == id) {
            session
                .select(id)
                .await
                .map_err(|e| context.fail(e, "failed to open work item"))?;
            return Ok(());
        }

        let current = session.pending().page;
        if current >= session.pending().total_pages {
            bail!("{} is not pending in {}", id, kind);
        }
        session
            .go_to_page(current + 1)
            .await
            .map_err(|e| context.fail(e, "failed to load the pending queue"))?;
    }
}

fn parse_assignment(raw: &str) -> Result<(usize, &str)> {
    let (index, code) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected INDEX=CODE, got '{}'", raw))?;
    let index = index
        .trim()
        .parse::<usize>()
        .with_context(|| format!("invalid line index in '{}'", raw))?;
    Ok((index, code.trim()))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueRow {
    id: String,
    kind: QueueKind,
    reference: String,
    counterparty: Option<String>,
    lines: usize,
}

impl From<&PendingWorkItem> for QueueRow {
    fn from(item: &PendingWorkItem) -> Self {
        Self {
            id: item.id().to_string(),
            kind: item.kind(),
            reference: item.reference(),
            counterparty: item.counterparty().map(str::to_string),
            lines: item.line_count(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueView {
    kind: QueueKind,
    page: u32,
    total_pages: u32,
    total_records: u64,
    items: Vec<QueueRow>,
}

#[derive(Serialize)]
struct CommitView<'a> {
    kind: QueueKind,
    id: &'a str,
    message: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    operator: Option<String>,
    token: String,
    saved_at: String,
}

impl From<&StoredSession> for SessionView {
    fn from(session: &StoredSession) -> Self {
        Self {
            operator: session.operator.clone(),
            token: mask_token(&session.access_token),
            saved_at: session.saved_at.to_rfc3339(),
        }
    }
}

fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(6).collect();
    format!("{}…", visible)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_queue_row(row: &QueueRow) {
    println!(
        "- {} • {} • {} • {} line(s)",
        row.id,
        row.reference,
        row.counterparty.as_deref().unwrap_or("-"),
        row.lines
    );
}

fn render_line(index: usize, line: &LineItem) {
    let rack = if line.has_location() {
        line.rack.as_str()
    } else {
        "(unassigned)"
    };
    println!(
        "  [{}] {} • sku {} • batch {} • qty {} • rack {}",
        index,
        line.display_name(),
        line.effective_sku().unwrap_or("-"),
        line.batch_number.as_deref().unwrap_or("-"),
        line.received_qty,
        rack
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_parses_index_and_code() {
        assert_eq!(parse_assignment("1=A1-R01-S1-B01").unwrap(), (1, "A1-R01-S1-B01"));
        assert!(parse_assignment("A1-R01").is_err());
        assert!(parse_assignment("x=A1").is_err());
    }

    #[test]
    fn cli_parses_commit_with_assignments() {
        let cli = Cli::try_parse_from([
            "putaway", "putaway", "commit", "--type", "sales-return", "--id", "r1", "--assign",
            "0=A1", "--assign", "1=B2", "--yes",
        ])
        .unwrap();
        match cli.command {
            Commands::Putaway(PutawayCommands::Commit(args)) => {
                assert_eq!(args.assignments, vec!["0=A1", "1=B2"]);
                assert!(args.yes);
                assert_eq!(QueueKind::from(args.kind), QueueKind::SalesReturn);
            }
            _ => panic!("expected putaway commit"),
        }
    }

    #[test]
    fn token_is_masked() {
        assert_eq!(mask_token("abcdefghijkl"), "abcdef…");
    }
}
