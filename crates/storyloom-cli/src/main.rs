use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use storyloom_contracts::models::{ModelRegistry, ModelSpec};
use storyloom_contracts::requests::{GenerationRequest, MAX_IMAGE_COUNT};
use storyloom_contracts::styles::ImageStyle;
use storyloom_engine::{is_placeholder, CancelToken, CoauthorEngine, EngineConfig, StoryContext};

#[derive(Debug, Parser)]
#[command(name = "storyloom", version, about = "Storyloom co-authoring CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Illustrate a scene or a chapter.
    Images(ImagesArgs),
    Idea(IdeaArgs),
    Expand(ExpandArgs),
    Character(CharacterArgs),
    Translate(TranslateArgs),
    Scene(SceneArgs),
    /// List the supported art styles.
    Styles,
    /// List the known models in preference order.
    Models,
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
}

#[derive(Debug, Args)]
struct StoryArgs {
    #[arg(long, default_value = "")]
    title: String,
    #[arg(long, default_value = "")]
    genre: String,
    #[arg(long, default_value = "")]
    synopsis: String,
    /// File holding the latest prose of the story.
    #[arg(long)]
    recent: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ImagesArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long, conflicts_with = "chapter", required_unless_present = "chapter")]
    prompt: Option<String>,
    /// Chapter text file; a scene description is derived from it first.
    #[arg(long)]
    chapter: Option<PathBuf>,
    #[arg(long, default_value = "Digital Art")]
    style: String,
    #[arg(long)]
    adult: bool,
    #[arg(long, default_value_t = 1)]
    count: u32,
    /// Cancel the batch after this many seconds, keeping what was produced.
    #[arg(long)]
    deadline_secs: Option<u64>,
    /// Print the batch summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct IdeaArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long, default_value = "")]
    genre: String,
    #[arg(long, default_value = "")]
    premise: String,
}

#[derive(Debug, Args)]
struct ExpandArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[command(flatten)]
    story: StoryArgs,
    #[arg(long, default_value = "")]
    text: String,
}

#[derive(Debug, Args)]
struct CharacterArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[command(flatten)]
    story: StoryArgs,
    #[arg(long, default_value = "")]
    role: String,
}

#[derive(Debug, Args)]
struct TranslateArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    text: Option<String>,
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SceneArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long)]
    chapter: PathBuf,
}

const NOTHING_PRODUCED_EXIT: i32 = 2;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("storyloom error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Images(args) => run_images(args),
        Command::Idea(args) => {
            let mut engine = open_engine(&args.session)?;
            let text = engine
                .assistant()?
                .generate_story_idea(&args.genre, &args.premise);
            Ok(print_text(&text))
        }
        Command::Expand(args) => {
            let context = story_context(&args.story)?;
            let mut engine = open_engine(&args.session)?;
            let text = engine.assistant()?.expand_text(&context, &args.text);
            Ok(print_text(&text))
        }
        Command::Character(args) => {
            let context = story_context(&args.story)?;
            let mut engine = open_engine(&args.session)?;
            let text = engine.assistant()?.suggest_character(&context, &args.role);
            Ok(print_text(&text))
        }
        Command::Translate(args) => {
            let source = match (&args.text, &args.file) {
                (Some(text), _) => text.clone(),
                (None, Some(path)) => read_text_file(path)?,
                (None, None) => bail!("--text or --file is required"),
            };
            let mut engine = open_engine(&args.session)?;
            let text = engine.assistant()?.translate_to_bengali(&source);
            Ok(print_text(&text))
        }
        Command::Scene(args) => {
            let chapter = read_text_file(&args.chapter)?;
            let mut engine = open_engine(&args.session)?;
            let text = engine.assistant()?.generate_scene_description(&chapter);
            Ok(print_text(&text))
        }
        Command::Styles => {
            for style in ImageStyle::ALL {
                println!("{:<16} {}", style.label(), style.phrase());
            }
            Ok(0)
        }
        Command::Models => {
            for model in ModelRegistry::new(None).list() {
                println!("{}", model_line(model));
            }
            Ok(0)
        }
    }
}

fn run_images(args: ImagesArgs) -> Result<i32> {
    if args.count == 0 || args.count > MAX_IMAGE_COUNT {
        bail!("--count must be between 1 and {MAX_IMAGE_COUNT}");
    }
    let style = ImageStyle::parse(&args.style);
    if let Some(warning) = style_fallback_warning(&args.style) {
        eprintln!("{warning}");
    }

    let mut engine = open_engine(&args.session)?;
    let cancel = CancelToken::new();
    if let Some(secs) = args.deadline_secs {
        spawn_deadline(cancel.clone(), Duration::from_secs(secs));
    }

    let illustration = match (&args.prompt, &args.chapter) {
        (Some(prompt), _) => {
            let request = GenerationRequest::new(prompt.clone())
                .with_style(style)
                .with_adult(args.adult)
                .with_count(args.count);
            engine.illustrate(&request, &cancel)?
        }
        (None, Some(chapter)) => {
            let template = GenerationRequest::new("")
                .with_style(style)
                .with_adult(args.adult)
                .with_count(args.count);
            engine.illustrate_chapter(&read_text_file(chapter)?, &template, &cancel)?
        }
        (None, None) => bail!("--prompt or --chapter is required"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&illustration.summary)?);
    } else {
        for path in &illustration.paths {
            println!("{}", path.display());
        }
    }
    if let Some(reason) = engine.last_fallback_reason() {
        eprintln!("{reason}");
    }
    let summary = &illustration.summary;
    eprintln!(
        "Saved {} of {} images to {}{}",
        summary.produced,
        summary.requested,
        engine.session_dir().display(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    if summary.abandoned() > 0 {
        eprintln!(
            "{} slot(s) abandoned; see {}",
            summary.abandoned(),
            illustration.summary_path.display()
        );
    }
    Ok(0)
}

fn open_engine(session: &SessionArgs) -> Result<CoauthorEngine> {
    let mut config = EngineConfig::from_env(&session.out)
        .with_text_model(session.text_model.clone())
        .with_image_model(session.image_model.clone());
    if let Some(events) = &session.events {
        config = config.with_events_path(events);
    }
    let mut engine = CoauthorEngine::new(config)?;
    engine.emit_event(
        "cli_command",
        json!({ "argv": std::env::args().skip(1).collect::<Vec<_>>() })
            .as_object()
            .cloned()
            .unwrap_or_default(),
    )?;
    Ok(engine)
}

fn story_context(story: &StoryArgs) -> Result<StoryContext> {
    let recent = match &story.recent {
        Some(path) => read_text_file(path)?,
        None => String::new(),
    };
    Ok(StoryContext::new(story.title.clone())
        .with_genre(story.genre.clone())
        .with_synopsis(story.synopsis.clone())
        .with_recent_text(recent))
}

fn read_text_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_text(text: &str) -> i32 {
    println!("{text}");
    if is_placeholder(text) {
        eprintln!("Nothing was produced.");
        return NOTHING_PRODUCED_EXIT;
    }
    0
}

fn spawn_deadline(cancel: CancelToken, after: Duration) {
    thread::spawn(move || {
        thread::sleep(after);
        cancel.cancel();
    });
}

fn model_line(model: &ModelSpec) -> String {
    let capabilities = model
        .capabilities
        .iter()
        .map(|capability| capability.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let context = model
        .context_window
        .map(|tokens| format!("{tokens} tokens"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<28} {:<8} {:<11} {}",
        model.name, model.provider, capabilities, context
    )
}

fn style_fallback_warning(raw: &str) -> Option<String> {
    if ImageStyle::lookup(raw).is_some() {
        return None;
    }
    Some(format!(
        "Unknown style '{}'; using {}.",
        raw.trim(),
        ImageStyle::default().label()
    ))
}
