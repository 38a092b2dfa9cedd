mod logging;

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use mascot_contracts::chat::{parse_command, Command as ChatCommand, CHAT_HELP_COMMANDS};
use mascot_contracts::events::EventWriter;
use mascot_contracts::media::{mime_for_path, EncodedImage};
use mascot_contracts::projects::ProjectRecord;
use mascot_contracts::sections::{ComponentKind, FontSizes, ImageSlot, MoveDirection, SectionPatch};
use mascot_engine::matting::{remove_background, MattingOptions};
use mascot_engine::{build_session, EngineConfig, ImageAdjustments, StudioSession};
use tracing::{info, warn};

use crate::logging::{init_logging, LogConfig, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "mascot-rs", version, about = "Mascot sticker generator and site studio")]
struct Cli {
    /// -v for info, -vv for debug, -vvv for trace.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Generate(GenerateArgs),
    Matte(MatteArgs),
    Studio(StudioArgs),
}

#[derive(Debug, Parser)]
struct ProviderArgs {
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    reference: Option<PathBuf>,
    /// Also generate the two pose variations.
    #[arg(long)]
    variations: bool,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Debug, Parser)]
struct MatteArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
}

#[derive(Debug, Parser)]
struct StudioArgs {
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    provider: ProviderArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("mascot-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_verbosity(cli.verbose).with_format(cli.log_format));
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Matte(args) => run_matte(args),
        Command::Studio(args) => {
            run_studio(args)?;
            Ok(0)
        }
    }
}

fn engine_config(args: &ProviderArgs) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    if let Some(provider) = args.provider.as_deref() {
        config.provider = provider.trim().to_ascii_lowercase();
    }
    if let Some(model) = args.model.as_deref() {
        config.image_model = model.trim().to_string();
    }
    config
}

fn open_session(out: &Path, args: &ProviderArgs) -> Result<StudioSession> {
    fs::create_dir_all(out).with_context(|| format!("failed creating {}", out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| out.join("events.jsonl"));
    let session_id = out
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("mascot-rs")
        .to_string();
    let config = engine_config(args);
    info!(provider = %config.provider, model = %config.image_model, "starting session");
    build_session(&config, EventWriter::new(events_path, session_id), |message| {
        println!("{message}")
    })
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let mut session = open_session(&args.out, &args.provider)?;
    if let Some(path) = args.reference.as_deref() {
        session.set_reference(Some(EncodedImage::read(path)?));
    }

    let result = generate_set(&mut session, &args.prompt, args.variations);
    let written = write_images(session.images(), &args.out, |idx| format!("image-{}", idx + 1));
    session.finish()?;
    result?;
    for path in written? {
        println!("Wrote {}", path.display());
    }
    Ok(0)
}

fn generate_set(session: &mut StudioSession, prompt: &str, variations: bool) -> Result<()> {
    session.generate_anchor(prompt)?;
    if variations {
        let outcome = session.generate_variations()?;
        if let Some(notice) = outcome.notice() {
            eprintln!("{notice}");
        }
    }
    Ok(())
}

fn run_matte(args: MatteArgs) -> Result<i32> {
    let source = EncodedImage::read(&args.input)?;
    let matted = remove_background(&source, &MattingOptions::default());
    let output = matte_output_path(&args.output, &matted);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, &matted.bytes)
        .with_context(|| format!("failed writing {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(0)
}

/// Undecodable input passes through unchanged, so the extension follows the
/// bytes actually written.
fn matte_output_path(requested: &Path, image: &EncodedImage) -> PathBuf {
    if mime_for_path(requested) == Some(image.mime_type.as_str()) {
        return requested.to_path_buf();
    }
    let output = requested.with_extension(image.extension());
    warn!(
        requested = %requested.display(),
        output = %output.display(),
        mime_type = %image.mime_type,
        "output extension does not match image type"
    );
    output
}

fn run_studio(args: StudioArgs) -> Result<()> {
    let mut session = open_session(&args.out, &args.provider)?;
    let stdin = io::stdin();
    let mut line = String::new();

    println!("Mascot studio started. Describe your character, or type /help for commands.");

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

        let command = parse_command(line.trim_end_matches(['\n', '\r']));
        if command.action == "noop" {
            continue;
        }
        match handle_command(&mut session, &command, &args.out) {
            Ok(lines) => {
                for text in lines {
                    println!("{text}");
                }
            }
            Err(err) => println!("Error: {err:#}"),
        }
    }

    session.finish()
}

/// Applies one parsed command and returns the lines to show the user.
fn handle_command(
    session: &mut StudioSession,
    command: &ChatCommand,
    out: &Path,
) -> Result<Vec<String>> {
    let lines = match command.action.as_str() {
        "help" => vec![format!("Commands: {}", CHAT_HELP_COMMANDS.join(" "))],
        "generate" => {
            let prompt = command.prompt.as_deref().unwrap_or_default();
            session.generate_anchor(prompt)?;
            vec!["Character ready. /variations for more poses, /build to continue.".to_string()]
        }
        "generate_variations" => {
            let outcome = session.generate_variations()?;
            let mut lines = vec![format!(
                "{} candidate(s) available.",
                session.images().len()
            )];
            lines.extend(outcome.notice().map(str::to_string));
            lines
        }
        "select_image" => {
            let index = one_based(command.arg_u64("index"), "/select <n>")?;
            session.select_image(index)?;
            vec![format!("Selected image {}", index + 1)]
        }
        "build" => {
            session.proceed_to_builder()?;
            vec!["Website slots filled: hero, about, buy, tokenomics.".to_string()]
        }
        "set_reference" => match command.arg_str("path") {
            Some(path) => {
                session.set_reference(Some(EncodedImage::read(Path::new(path))?));
                vec![format!("Reference image set to {path}")]
            }
            None => {
                session.set_reference(None);
                vec!["Reference image cleared".to_string()]
            }
        },
        "set_field" => {
            let section = required(command.arg_str("section"), "section id")?;
            let value = command.arg_str("value").unwrap_or_default().to_string();
            let mut patch = SectionPatch::default();
            match command.arg_str("field") {
                Some("heading") => patch.heading = Some(value),
                Some("paragraph") => patch.paragraph = Some(value),
                Some("nav_title") => patch.nav_title = Some(value),
                other => bail!("unsupported field: {}", other.unwrap_or_default()),
            }
            session.update_section(section, &patch)?;
            vec![format!("Updated {section}")]
        }
        "set_items" => {
            let section = required(command.arg_str("section"), "section id")?;
            let patch = SectionPatch {
                items: Some(command.arg_list("items")),
                ..SectionPatch::default()
            };
            session.update_section(section, &patch)?;
            vec![format!("Updated {section} items")]
        }
        "set_social" => {
            let platform = required(command.arg_str("platform"), "platform")?;
            let url = command.arg_str("url").unwrap_or_default();
            let Some(socials) = session
                .sections()
                .iter()
                .find(|section| section.component == ComponentKind::Socials)
            else {
                bail!("this project has no socials section");
            };
            let id = socials.id.clone();
            let mut links = socials.content.social_links.clone().unwrap_or_default();
            links.set(platform, url)?;
            let patch = SectionPatch {
                social_links: Some(links),
                ..SectionPatch::default()
            };
            session.update_section(&id, &patch)?;
            vec![format!("Updated {platform} link")]
        }
        "set_font_size" => {
            let section = required(command.arg_str("section"), "section id")?;
            let size = required(command.arg_str("size"), "size")?.to_string();
            let Some(node) = session.sections().iter().find(|node| node.id == section) else {
                bail!("unknown section: {section}");
            };
            let mut sizes: FontSizes = node.content.custom_font_sizes.clone().unwrap_or_default();
            match command.arg_str("field") {
                Some("heading") => sizes.heading = Some(size),
                Some("paragraph") => sizes.paragraph = Some(size),
                _ => bail!("/font_size <section> <heading|paragraph> <size>"),
            }
            let patch = SectionPatch {
                custom_font_sizes: Some(sizes),
                ..SectionPatch::default()
            };
            session.update_section(section, &patch)?;
            vec![format!("Updated {section} font size")]
        }
        "move_section" => {
            let section = required(command.arg_str("section"), "section id")?;
            let Some(direction) = command.arg_str("direction").and_then(MoveDirection::parse)
            else {
                bail!("/move <section> <up|down>");
            };
            session.move_section(section, direction)?;
            vec![format!("Moved {section}")]
        }
        "undo" => vec![if session.undo() { "Undone" } else { "Nothing to undo" }.to_string()],
        "redo" => vec![if session.redo() { "Redone" } else { "Nothing to redo" }.to_string()],
        "show_sections" => session
            .sections()
            .iter()
            .enumerate()
            .map(|(idx, section)| {
                format!(
                    "{}. {} [{}] {}",
                    idx + 1,
                    section.id,
                    section.component,
                    section.content.heading.as_deref().unwrap_or("")
                )
                .trim_end()
                .to_string()
            })
            .collect(),
        "edit_image" => {
            let index = one_based(command.arg_u64("slot"), "/edit <slot> <prompt>")?;
            let prompt = required(command.prompt.as_deref(), "edit prompt")?;
            session.edit_slot(index, prompt, ImageAdjustments::default())?;
            vec![format!("Edited {}", slot_label(index))]
        }
        "adjust_image" => {
            let index = one_based(command.arg_u64("slot"), "/adjust <slot> <b> <c> <s>")?;
            let adjustments = ImageAdjustments::new(
                command.arg_f64("brightness").unwrap_or(100.0),
                command.arg_f64("contrast").unwrap_or(100.0),
                command.arg_f64("saturation").unwrap_or(100.0),
            );
            session.apply_adjustments(index, adjustments)?;
            vec![format!("Adjusted {}", slot_label(index))]
        }
        "save_project" => {
            let path = command
                .arg_str("path")
                .map(PathBuf::from)
                .unwrap_or_else(|| out.join("project.json"));
            let record = session.save_project(&path)?;
            vec![format!("Saved \"{}\" to {}", record.name, path.display())]
        }
        "open_project" => {
            let path = required(command.arg_str("path"), "project path")?;
            let record = ProjectRecord::load(Path::new(path))?;
            session.open_project(&record)?;
            vec![format!("Opened \"{}\"", record.name)]
        }
        "export_images" => {
            let dir = command
                .arg_str("path")
                .map(PathBuf::from)
                .unwrap_or_else(|| out.to_path_buf());
            let in_builder = session.in_builder();
            let written = write_images(session.images(), &dir, |idx| {
                match ImageSlot::from_index(idx).filter(|_| in_builder) {
                    Some(slot) => slot.to_string(),
                    None => format!("image-{}", idx + 1),
                }
            })?;
            written
                .iter()
                .map(|path| format!("Wrote {}", path.display()))
                .collect()
        }
        "new_project" => {
            session.new_project();
            vec!["Started a new project".to_string()]
        }
        "unknown" => vec![format!(
            "Unknown command /{}. Type /help for commands.",
            command.arg_str("command").unwrap_or_default()
        )],
        other => vec![format!("Unsupported action: {other}")],
    };
    Ok(lines)
}

fn one_based(value: Option<u64>, usage: &str) -> Result<usize> {
    match value {
        Some(number) if number >= 1 => Ok(number as usize - 1),
        _ => bail!("usage: {usage}"),
    }
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str> {
    value.with_context(|| format!("missing {what}"))
}

fn slot_label(index: usize) -> String {
    ImageSlot::from_index(index)
        .map(|slot| slot.to_string())
        .unwrap_or_else(|| format!("slot {}", index + 1))
}

fn write_images(
    images: &[EncodedImage],
    dir: &Path,
    stem: impl Fn(usize) -> String,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;
    let mut written = Vec::with_capacity(images.len());
    for (idx, image) in images.iter().enumerate() {
        let path = dir.join(format!("{}.{}", stem(idx), image.extension()));
        fs::write(&path, &image.bytes)
            .with_context(|| format!("failed writing {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
