use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use roomcraft_contracts::chat::{parse_intent, REPL_HELP_COMMANDS};
use roomcraft_contracts::events::EventWriter;
use roomcraft_contracts::styles::{slugify, StyleCatalog};
use roomcraft_engine::codec::write_image;
use roomcraft_engine::{DesignStudio, ImageFile, StudioConfig, StudioError, StudioUpdate};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "roomcraft", version, about = "Restyle room photos and chat with a design assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive studio session.
    Chat(ChatArgs),
    /// Restyle one photo, apply optional edits and write before/after files.
    Restyle(RestyleArgs),
    /// Print the style catalog.
    Styles,
}

#[derive(Debug, Clone, Args)]
struct ModelArgs {
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    text_model: Option<String>,
    /// Use the offline providers; no API key needed.
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    /// Room photo to load on start.
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Debug, Parser)]
struct RestyleArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    style: String,
    /// Edit instruction applied after restyling; repeat to chain edits.
    #[arg(long)]
    edit: Vec<String>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    models: ModelArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("roomcraft error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Restyle(args) => run_restyle(args),
        Command::Styles => {
            print_styles(&StyleCatalog::default(), None);
            Ok(0)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn build_studio(models: &ModelArgs, events: Option<&Path>) -> Result<DesignStudio> {
    let mut config = StudioConfig::from_env()
        .with_models(models.image_model.clone(), models.text_model.clone());
    if models.dryrun {
        config = config.dryrun();
    }
    let session_id = Uuid::new_v4().to_string();
    let events = match events {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            EventWriter::new(path, session_id)
        }
        None => EventWriter::disabled(session_id),
    };
    DesignStudio::from_config(&config, events).context("failed to set up the studio")
}

/// Prints busy labels while the main thread is blocked in a service call.
/// Ends once the studio (and with it the sender) is dropped.
fn spawn_status_printer(updates: Receiver<StudioUpdate>) -> JoinHandle<()> {
    thread::spawn(move || {
        for update in updates {
            if let StudioUpdate::StatusChanged {
                busy: true, label, ..
            } = update
            {
                eprintln!("... {label}");
            }
        }
    })
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut studio = build_studio(&args.models, args.events.as_deref())?;
    let printer = spawn_status_printer(studio.subscribe());

    println!(
        "Roomcraft studio ({} / {}). Type /help for commands.",
        studio.image_model(),
        studio.text_model()
    );
    if let Some(path) = args.image.as_deref() {
        upload(&mut studio, path);
    }

    let stdin = io::stdin();
    let mut line = String::new();
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

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        match intent.action.as_str() {
            "noop" => continue,
            "help" => print_help(),
            "quit" => break,
            "list_styles" => print_styles(studio.catalog(), studio.active_style()),
            "show_status" => print_status(&studio),
            "dismiss_error" => {
                studio.dismiss_error();
                println!("Error cleared.");
            }
            "upload_image" => {
                let path = intent.arg("path");
                if path.is_empty() {
                    println!("/upload requires a path");
                    continue;
                }
                upload(&mut studio, Path::new(path));
            }
            "select_style" => {
                let name = intent.arg("style");
                if name.is_empty() {
                    println!("/style requires a name (see /styles)");
                    continue;
                }
                match studio.select_style(name) {
                    Ok(image) => println!(
                        "Showing {} [{} {}]. Refine it with /edit <instruction>.",
                        studio.active_style().unwrap_or(name),
                        image.mime_type,
                        image.digest()
                    ),
                    Err(err) => report(&err),
                }
            }
            "edit_image" => match studio.edit_current_image(intent.arg("instruction")) {
                Ok(image) => println!(
                    "Edit applied to {} [{} {}].",
                    studio.active_style().unwrap_or_default(),
                    image.mime_type,
                    image.digest()
                ),
                Err(err) => report(&err),
            },
            "save_images" => {
                let dir = intent.arg("path");
                if dir.is_empty() {
                    println!("/save requires a directory");
                    continue;
                }
                match export_before_after(&studio, Path::new(dir)) {
                    Ok(paths) => {
                        for path in paths {
                            println!("Saved {}", path.display());
                        }
                    }
                    Err(err) => println!("Save failed: {err:#}"),
                }
            }
            "unknown" => println!(
                "Unknown command /{}. Type /help for commands.",
                intent.arg("command")
            ),
            "chat" => {
                let message = intent.message.as_deref().unwrap_or_default();
                match studio.send_chat_message(message) {
                    Ok(reply) => println!("assistant: {reply}"),
                    Err(err) => report(&err),
                }
            }
            _ => {}
        }
    }

    info!(
        messages = studio.transcript().len(),
        styles = studio.variants().len(),
        "leaving studio"
    );
    drop(studio);
    let _ = printer.join();
    Ok(())
}

fn run_restyle(args: RestyleArgs) -> Result<i32> {
    let mut studio = build_studio(&args.models, args.events.as_deref())?;
    let printer = spawn_status_printer(studio.subscribe());
    let outcome = restyle_once(&mut studio, &args);
    drop(studio);
    let _ = printer.join();

    for path in outcome? {
        println!("{}", path.display());
    }
    Ok(0)
}

fn restyle_once(studio: &mut DesignStudio, args: &RestyleArgs) -> Result<Vec<PathBuf>> {
    match studio.upload_image(&ImageFile::from_path(&args.image)) {
        // The assistant is not needed for a one-shot restyle.
        Ok(()) | Err(StudioError::Initialization { .. }) => {}
        Err(err) => return Err(err.into()),
    }
    studio.select_style(&args.style)?;
    for instruction in &args.edit {
        studio.edit_current_image(instruction)?;
    }
    export_before_after(studio, &args.out)
}

/// Writes `original.<ext>` and, when one is shown, `<style-slug>.<ext>`.
fn export_before_after(studio: &DesignStudio, dir: &Path) -> Result<Vec<PathBuf>> {
    let original = studio
        .original()
        .context("nothing to save; upload a room photo first")?;
    let mut written = vec![write_image(dir, "original", original)?];
    if let (Some(style), Some(variant)) = (studio.active_style(), studio.current_variant()) {
        written.push(write_image(dir, &slugify(style), variant)?);
    }
    Ok(written)
}

fn upload(studio: &mut DesignStudio, path: &Path) {
    match studio.upload_image(&ImageFile::from_path(path)) {
        Ok(()) => println!(
            "Loaded {}. Pick a style with /style <name>.",
            path.display()
        ),
        Err(err @ StudioError::Initialization { .. }) => {
            println!("Loaded {}.", path.display());
            report(&err);
        }
        Err(err) => report(&err),
    }
}

fn report(err: &StudioError) {
    println!("! {}", err.user_message());
}

fn print_help() {
    println!("Commands:");
    for (command, summary) in REPL_HELP_COMMANDS {
        println!("  {command:<22} {summary}");
    }
    println!("Anything else is sent to the design assistant.");
}

fn print_styles(catalog: &StyleCatalog, active: Option<&str>) {
    for (index, style) in catalog.list().enumerate() {
        let marker = if active == Some(style.name.as_str()) { "*" } else { " " };
        println!("{marker}{:>3}. {}", index + 1, style.name);
    }
}

fn print_status(studio: &DesignStudio) {
    let snapshot = studio.snapshot();
    println!(
        "photo:     {}",
        snapshot.original_mime_type.as_deref().unwrap_or("none")
    );
    println!(
        "style:     {}",
        snapshot.active_style.as_deref().unwrap_or("none")
    );
    if snapshot.generated_styles.is_empty() {
        println!("generated: none");
    } else {
        println!("generated: {}", snapshot.generated_styles.join(", "));
    }
    let assistant = if snapshot.session_id.is_some() {
        ""
    } else {
        " (assistant unavailable)"
    };
    println!("chat:      {} messages{assistant}", snapshot.transcript_len);
    if !snapshot.pending_instruction.is_empty() {
        println!("edit:      {}", snapshot.pending_instruction);
    }
    if let Some(error) = snapshot.status.last_error.as_deref() {
        println!("error:     {error} (/dismiss to clear)");
    }
}
