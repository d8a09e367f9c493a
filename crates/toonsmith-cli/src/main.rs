use std::env;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use image::GenericImageView;
use similar::{ChangeTag, TextDiff};
use toonsmith_contracts::backends::BackendVariant;
use toonsmith_contracts::commands::{help_lines, parse_command, SessionCommand};
use toonsmith_contracts::credentials::{CredentialError, CredentialSource, CredentialStore};
use toonsmith_contracts::events::EventLog;
use toonsmith_contracts::plan::{Plan, PlanEdit, EDITABLE_FIELDS};
use toonsmith_contracts::receipts::{receipt_path_for, write_receipt, ImageReceipt};
use toonsmith_contracts::results::GenerationResult;
use toonsmith_contracts::styles::ArtStyle;
use toonsmith_engine::dispatch::image_request;
use toonsmith_engine::{EngineConfig, HttpTransport, Session, SessionError};

#[derive(Debug, Parser)]
#[command(name = "toonsmith", version, about = "Four-panel webtoon planner")]
struct Cli {
    /// Credential store file. Defaults to $TOONSMITH_HOME/credentials.json.
    #[arg(long, global = true, env = "TOONSMITH_STORE")]
    store: Option<PathBuf>,
    /// Append session events (JSONL) to this file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Key(KeyCommand),
    Styles,
    Plan(PlanArgs),
    Edit(EditArgs),
    Recompose(RecomposeArgs),
    Image(ImageArgs),
    Session(SessionArgs),
}

#[derive(Debug, Subcommand)]
enum KeyCommand {
    /// Save a personal API key.
    Set { value: String },
    /// Switch the active key source.
    Use { source: CredentialSource },
    /// Probe the active key with a one-token request.
    Verify,
    /// Forget the saved personal key.
    Clear,
    Show,
}

#[derive(Debug, Args)]
struct PlanArgs {
    #[arg(long)]
    subject: String,
    #[arg(long, default_value = "instatoon")]
    style: ArtStyle,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct EditArgs {
    #[arg(long)]
    plan: PathBuf,
    field: String,
    value: String,
}

#[derive(Debug, Args)]
struct RecomposeArgs {
    #[arg(long)]
    plan: PathBuf,
}

#[derive(Debug, Args)]
struct ImageArgs {
    #[arg(long)]
    plan: PathBuf,
    #[arg(long, default_value = "pro")]
    backend: BackendVariant,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// Start from a saved plan instead of an empty session.
    #[arg(long)]
    plan: Option<PathBuf>,
    /// Directory `/save` writes into when no path is given.
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

const EXIT_FAILED: i32 = 2;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("toonsmith error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let store_path = match cli.store.clone() {
        Some(path) => path,
        None => default_store_path()?,
    };
    let store = CredentialStore::new(store_path);
    match cli.command {
        Command::Key(command) => run_key(open_session(store, cli.events.as_deref()), command),
        Command::Styles => {
            print_styles();
            Ok(0)
        }
        Command::Plan(args) => run_plan(open_session(store, cli.events.as_deref()), args),
        Command::Edit(args) => run_edit(open_session(store, cli.events.as_deref()), args),
        Command::Recompose(args) => {
            run_recompose(open_session(store, cli.events.as_deref()), args)
        }
        Command::Image(args) => run_image(open_session(store, cli.events.as_deref()), args),
        Command::Session(args) => run_session(open_session(store, cli.events.as_deref()), args),
    }
}

fn default_store_path() -> Result<PathBuf> {
    store_path_from(|name| env::var(name).ok())
}

fn store_path_from(lookup: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
    if let Some(home) = non_empty("TOONSMITH_HOME") {
        return Ok(PathBuf::from(home).join("credentials.json"));
    }
    let Some(home) = non_empty("HOME").or_else(|| non_empty("USERPROFILE")) else {
        bail!("cannot locate a home directory; pass --store or set TOONSMITH_HOME");
    };
    Ok(PathBuf::from(home)
        .join(".toonsmith")
        .join("credentials.json"))
}

fn open_session(store: CredentialStore, events: Option<&Path>) -> Session {
    let config = EngineConfig::from_env();
    let transport = Arc::new(HttpTransport::new(config.request_timeout));
    let session = Session::new(config, store, transport);
    match events {
        Some(path) => session.with_event_log(EventLog::with_random_session(path)),
        None => session,
    }
}

fn load_plan(path: &Path) -> Result<Plan> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid plan file {}", path.display()))
}

fn save_plan(path: &Path, plan: &Plan) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut body = serde_json::to_string_pretty(plan)?;
    body.push('\n');
    fs::write(path, body).with_context(|| format!("failed to write plan {}", path.display()))
}

fn report(err: &SessionError) -> i32 {
    log::debug!("{err:?}");
    eprintln!("{}", err.user_message());
    EXIT_FAILED
}

fn print_styles() {
    for style in ArtStyle::ALL {
        println!("{:<12} {}  {}", style.slug(), style.label(), style.description());
    }
}

fn print_plan(plan: &Plan) {
    println!("Subject: {}", plan.subject);
    println!("Style:   {} ({})", plan.art_style.label(), plan.art_style.slug());
    println!(
        "Character: {} / {} / {}",
        plan.character.name, plan.character.appearance, plan.character.features
    );
    for (idx, (beat, dialogue)) in plan.story_beats.iter().zip(&plan.dialogues).enumerate() {
        println!("Panel {}: {beat}", idx + 1);
        println!("         \"{dialogue}\"");
    }
    println!("Info:  {}", plan.info_text_inline());
    if !plan.reference_sources.is_empty() {
        println!("Sources: {}", plan.reference_sources.join(", "));
    }
    println!(
        "Outro: {} {} \"{}\"",
        plan.outro.second_character, plan.outro.action, plan.outro.dialogue
    );
    println!("Color: {}", plan.main_color);
    println!("Prompt{}:", stale_marker(plan));
    println!("{}", plan.rendered_prompt);
}

fn stale_marker(plan: &Plan) -> &'static str {
    if plan.is_prompt_stale() {
        " (stale, run recompose)"
    } else {
        ""
    }
}

fn prompt_diff(before: &str, after: &str) -> String {
    let mut out = String::new();
    for change in TextDiff::from_lines(before, after).iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str(sign);
        out.push_str(change.value());
        if !change.value().ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

fn run_key(session: Session, command: KeyCommand) -> Result<i32> {
    let store = session.store();
    match command {
        KeyCommand::Set { value } => {
            if value.trim().is_empty() {
                bail!("API key is empty");
            }
            store.set_user_key(&value)?;
            println!("Saved personal key to {}", store.path().display());
        }
        KeyCommand::Use { source } => {
            store.set_active_source(source)?;
            println!("Active key source: {source}");
        }
        KeyCommand::Verify => match session.verify_active() {
            Ok(true) => println!("API key is valid."),
            Ok(false) => {
                eprintln!("API key was rejected.");
                return Ok(EXIT_FAILED);
            }
            Err(err) => return Ok(report(&err)),
        },
        KeyCommand::Clear => {
            store.clear_user_key()?;
            println!("Personal key cleared.");
        }
        KeyCommand::Show => {
            println!("Active source: {}", store.active_source());
            for source in [CredentialSource::User, CredentialSource::Platform] {
                match store.credential(source) {
                    Ok(credential) => println!("  {source:<8} {}", credential.masked()),
                    Err(CredentialError::Missing { .. }) => println!("  {source:<8} (not set)"),
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }
    Ok(0)
}

fn run_plan(mut session: Session, args: PlanArgs) -> Result<i32> {
    let plan = match session.create_plan(&args.subject, args.style) {
        Ok(plan) => plan,
        Err(err) => return Ok(report(&err)),
    };
    save_plan(&args.out, &plan)?;
    print_plan(&plan);
    println!("\nPlan written to {}", args.out.display());
    Ok(0)
}

fn run_edit(mut session: Session, args: EditArgs) -> Result<i32> {
    session.replace_plan(load_plan(&args.plan)?);
    let edit = match PlanEdit::from_field(&args.field, &args.value) {
        Ok(edit) => edit,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("Editable fields: {}", EDITABLE_FIELDS.join(", "));
            return Ok(EXIT_FAILED);
        }
    };
    let plan = match session.apply_edit(edit) {
        Ok(plan) => plan,
        Err(err) => return Ok(report(&err)),
    };
    save_plan(&args.plan, &plan)?;
    if plan.is_prompt_stale() {
        println!("Updated {}. Prompt is stale; run `toonsmith recompose`.", args.field);
    } else {
        println!("Updated {}. Prompt is up to date.", args.field);
    }
    Ok(0)
}

fn run_recompose(mut session: Session, args: RecomposeArgs) -> Result<i32> {
    let before = session.replace_plan(load_plan(&args.plan)?);
    let after = match session.recompose() {
        Ok(plan) => plan,
        Err(err) => return Ok(report(&err)),
    };
    if after.rendered_prompt == before.rendered_prompt {
        println!("Prompt unchanged.");
    } else {
        print!("{}", prompt_diff(&before.rendered_prompt, &after.rendered_prompt));
    }
    save_plan(&args.plan, &after)?;
    Ok(0)
}

/// Writes the png and its receipt; returns the receipt path.
fn save_image(session: &Session, out: &Path) -> Result<PathBuf> {
    let Some(current) = session.image() else {
        bail!("no image to save");
    };
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(out, &current.image.bytes)
        .with_context(|| format!("failed to write image {}", out.display()))?;

    let (_, request) = image_request(
        session.config(),
        &current.plan.rendered_prompt,
        current.backend,
    );
    let mut receipt = ImageReceipt::new(
        current.backend,
        &current.model,
        &current.plan,
        &current.image,
        out,
    )
    .with_request(&request);
    match image::load_from_memory(&current.image.bytes) {
        Ok(decoded) => {
            let (width, height) = decoded.dimensions();
            receipt = receipt.with_dimensions(width, height);
        }
        Err(err) => log::warn!("could not read image dimensions: {err}"),
    }
    let receipt_path = receipt_path_for(out);
    write_receipt(&receipt_path, &receipt)?;
    Ok(receipt_path)
}

/// Prints the outcome of one image request. Returns true when an image landed.
fn print_image_result(result: &GenerationResult) -> bool {
    match result {
        GenerationResult::Image(image) => {
            println!("Image ready ({} bytes, {}).", image.bytes.len(), image.mime_type);
            true
        }
        GenerationResult::Empty => {
            eprintln!("The backend returned no image. Try rephrasing or another backend.");
            false
        }
        GenerationResult::Failure(err) => {
            eprintln!("{}", err.user_message());
            eprintln!("Try --backend {}.", err.suggested_backend().as_str());
            false
        }
    }
}

fn run_image(mut session: Session, args: ImageArgs) -> Result<i32> {
    let plan = session.replace_plan(load_plan(&args.plan)?);
    if plan.is_prompt_stale() {
        log::warn!("rendering a stale prompt; run recompose to pick up plan edits");
    }
    let result = match session.generate_image(args.backend) {
        Ok(result) => result,
        Err(err) => return Ok(report(&err)),
    };
    if !print_image_result(&result) {
        return Ok(EXIT_FAILED);
    }
    let receipt = save_image(&session, &args.out)?;
    println!("Wrote {} ({})", args.out.display(), receipt.display());
    Ok(0)
}

fn run_session(mut session: Session, args: SessionArgs) -> Result<i32> {
    if let Some(path) = args.plan.as_deref() {
        session.replace_plan(load_plan(path)?);
        println!("Loaded plan from {}", path.display());
    }
    let mut style = session
        .plan()
        .map(|plan| plan.art_style)
        .unwrap_or(ArtStyle::Instatoon);

    let stdin = io::stdin();
    let mut line = String::new();
    println!("Toonsmith session started. Type /help for commands.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match parse_command(line.trim_end_matches(['\n', '\r'])) {
            SessionCommand::Noop => {}
            SessionCommand::Plan {
                style: requested,
                subject,
            } => {
                if let Some(requested) = requested {
                    style = requested;
                }
                println!("Planning '{subject}' in {} style...", style.label());
                match session.create_plan(&subject, style) {
                    Ok(plan) => print_plan(&plan),
                    Err(err) => {
                        report(&err);
                    }
                }
            }
            SessionCommand::Edit { field, value } => {
                let edit = match PlanEdit::from_field(&field, &value) {
                    Ok(edit) => edit,
                    Err(err) => {
                        println!("{err}");
                        println!("Editable fields: {}", EDITABLE_FIELDS.join(", "));
                        continue;
                    }
                };
                match session.apply_edit(edit) {
                    Ok(plan) => println!("Updated {field}{}", stale_marker(&plan)),
                    Err(err) => {
                        report(&err);
                    }
                }
            }
            SessionCommand::Recompose => {
                let before = session.plan();
                match session.recompose() {
                    Ok(after) => {
                        let previous = before
                            .map(|plan| plan.rendered_prompt.clone())
                            .unwrap_or_default();
                        if previous == after.rendered_prompt {
                            println!("Prompt unchanged.");
                        } else {
                            print!("{}", prompt_diff(&previous, &after.rendered_prompt));
                        }
                    }
                    Err(err) => {
                        report(&err);
                    }
                }
            }
            SessionCommand::Image { backend } => {
                let backend = backend.unwrap_or(BackendVariant::StandardPro);
                println!("Rendering with {}...", backend.display_name());
                match session.generate_image(backend) {
                    Ok(result) => {
                        print_image_result(&result);
                    }
                    Err(err) => {
                        report(&err);
                    }
                }
            }
            SessionCommand::Show => match session.plan() {
                Some(plan) => print_plan(&plan),
                None => println!("No plan yet. Type a subject or /plan <style> <subject>."),
            },
            SessionCommand::Save { path } => {
                let Some(plan) = session.plan() else {
                    println!("Nothing to save yet.");
                    continue;
                };
                let plan_path = path
                    .map(PathBuf::from)
                    .unwrap_or_else(|| args.out.join("plan.json"));
                save_plan(&plan_path, &plan)?;
                println!("Plan written to {}", plan_path.display());
                if session.image().is_some() {
                    let image_path = plan_path.with_extension("png");
                    let receipt = save_image(&session, &image_path)?;
                    println!("Image written to {} ({})", image_path.display(), receipt.display());
                }
            }
            SessionCommand::Key { source } => {
                let store = session.store();
                if let Some(source) = source {
                    store.set_active_source(source)?;
                }
                let active = store.active_source();
                match store.credential(active) {
                    Ok(credential) => println!("Active key: {credential}"),
                    Err(err) => println!("Active source {active}: {err}"),
                }
            }
            SessionCommand::Verify => match session.verify_active() {
                Ok(true) => println!("API key is valid."),
                Ok(false) => println!("API key was rejected."),
                Err(err) => {
                    report(&err);
                }
            },
            SessionCommand::Styles => print_styles(),
            SessionCommand::Help => {
                for entry in help_lines() {
                    println!("{entry}");
                }
            }
            SessionCommand::Quit => break,
            SessionCommand::Invalid { command, reason } => println!("/{command}: {reason}"),
            SessionCommand::Unknown { command } => {
                println!("Unknown command /{command}. Type /help for commands.")
            }
        }
    }
    Ok(0)
}
