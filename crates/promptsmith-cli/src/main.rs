use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use promptsmith_contracts::config::{AppPaths, ProviderConfig};
use promptsmith_contracts::document::{apply_document, diff_documents, document_text, to_document};
use promptsmith_contracts::form::{
    field_spec, fields_in, frame_preset, matching_preset, FieldKind, FormModel, FrameSettings,
    Section, FRAME_PRESETS, RATIO_OPTIONS, RESOLUTION_OPTIONS, USAGE_OPTIONS,
};
use promptsmith_contracts::stores::{OptionsStore, PresetStore};
use promptsmith_engine::{
    parse_ai_document, save_image, ImageGenerateRequest, ImageTaskEvent, ImageTaskSlot,
    StreamTranscript, TaskError, TextTaskEvent, TextTaskSlot, ASPECT_RATIOS, IMAGE_SIZES,
};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "promptsmith", version, about = "Structured image-prompt builder")]
struct Cli {
    /// Directory holding options.yaml, presets/ and ai_config.json.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List form fields by section together with their saved options.
    Fields,
    #[command(subcommand)]
    Options(OptionsCommand),
    #[command(subcommand)]
    Preset(PresetCommand),
    /// Build a form and print its prompt document.
    Compose(ComposeArgs),
    #[command(subcommand)]
    Ai(AiCommand),
    /// Generate an image from a preset's prompt document.
    Image(ImageArgs),
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum OptionsCommand {
    List { field: Option<String> },
    Add { field: String, value: String },
    Remove { field: String, value: String },
    Rename { field: String, old: String, new: String },
}

#[derive(Debug, Subcommand)]
enum PresetCommand {
    List,
    Show { name: String },
    Delete { name: String },
    Rename { old: String, new: String },
}

#[derive(Debug, Args)]
struct ComposeArgs {
    #[arg(long)]
    preset: Option<String>,
    /// Reset every field and toggle after the preset is loaded.
    #[arg(long)]
    clear: bool,
    /// FIELD=VALUE for a text field.
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    sets: Vec<String>,
    /// FIELD=ITEM toggles ITEM in a checklist field.
    #[arg(long = "select", value_name = "FIELD=ITEM")]
    selects: Vec<String>,
    #[arg(long, conflicts_with_all = ["ratio", "resolution", "usage"])]
    frame_preset: Option<String>,
    #[arg(long)]
    ratio: Option<String>,
    #[arg(long)]
    resolution: Option<String>,
    #[arg(long)]
    usage: Option<String>,
    #[arg(long)]
    no_frame: bool,
    #[arg(long, conflicts_with = "no_negative")]
    negative: bool,
    #[arg(long)]
    no_negative: bool,
    #[arg(long)]
    save_as: Option<String>,
}

#[derive(Debug, Subcommand)]
enum AiCommand {
    /// Write a new prompt document from a free-text description.
    Generate {
        #[arg(long)]
        description: String,
        #[arg(long)]
        save_as: Option<String>,
    },
    /// Revise a saved preset according to an instruction.
    Modify {
        #[arg(long)]
        preset: String,
        #[arg(long)]
        instruction: String,
        #[arg(long)]
        save_as: Option<String>,
    },
}

#[derive(Debug, Args)]
struct ImageArgs {
    #[arg(long)]
    preset: String,
    #[arg(long = "ref", value_name = "PATH")]
    references: Vec<PathBuf>,
    #[arg(long, default_value = "1:1")]
    aspect: String,
    #[arg(long, default_value = "1K")]
    size: String,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    Show,
    Set(ConfigSetArgs),
}

#[derive(Debug, Args)]
struct ConfigSetArgs {
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    image_api_key: Option<String>,
    #[arg(long)]
    image_base_url: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
}

/// Stores rooted at one data directory.
struct Workspace {
    paths: AppPaths,
    options: OptionsStore,
    presets: PresetStore,
}

impl Workspace {
    fn open(data_dir: Option<&Path>) -> Result<Self> {
        let paths = AppPaths::resolve(data_dir)?;
        log::debug!("using data directory {}", paths.root().display());
        Ok(Self {
            options: OptionsStore::new(paths.options_file()),
            presets: PresetStore::new(paths.presets_dir()),
            paths,
        })
    }

    fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::load(&self.paths.config_file())
    }

    fn load_preset(&self, name: &str) -> Result<Value> {
        self.presets
            .load(name)
            .with_context(|| format!("preset '{name}' not found in {}", self.presets.dir().display()))
    }

    fn save_preset(&self, name: &str, document: &Value) -> Result<String> {
        let Some(saved) = self.presets.save_named(name, document) else {
            bail!("failed to save preset '{name}'");
        };
        Ok(saved)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("promptsmith error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let workspace = Workspace::open(cli.data_dir.as_deref())?;
    match cli.command {
        Command::Fields => run_fields(&workspace),
        Command::Options(command) => run_options(&workspace, command),
        Command::Preset(command) => run_preset(&workspace, command),
        Command::Compose(args) => run_compose(&workspace, args),
        Command::Ai(command) => run_ai(&workspace, command),
        Command::Image(args) => run_image(&workspace, args),
        Command::Config(command) => run_config(&workspace, command),
    }
}

fn run_fields(workspace: &Workspace) -> Result<i32> {
    let options = workspace.options.all_options();
    for section in Section::ALL {
        let suffix = if section.is_optional() { " (optional)" } else { "" };
        println!("{}{suffix}", section.title());
        for spec in fields_in(section) {
            let saved = options.get(spec.name).map(Vec::len).unwrap_or(0);
            println!("  {:<24} {} [{saved} saved]", spec.name, spec.label);
        }
    }
    println!("frame presets:");
    for preset in FRAME_PRESETS {
        println!(
            "  {:<24} {} / {} / {}",
            preset.name, preset.ratio, preset.resolution, preset.usage
        );
    }
    println!("frame ratios:      {}", RATIO_OPTIONS.join(", "));
    println!("frame resolutions: {}", RESOLUTION_OPTIONS.join(", "));
    println!("frame usages:      {}", USAGE_OPTIONS.join(", "));
    Ok(0)
}

fn run_options(workspace: &Workspace, command: OptionsCommand) -> Result<i32> {
    let store = &workspace.options;
    let changed = match command {
        OptionsCommand::List { field: Some(field) } => {
            require_field(&field)?;
            for value in store.get_options(&field) {
                println!("{value}");
            }
            return Ok(0);
        }
        OptionsCommand::List { field: None } => {
            for (field, values) in store.all_options() {
                println!("{field}:");
                for value in values {
                    println!("  - {value}");
                }
            }
            return Ok(0);
        }
        OptionsCommand::Add { field, value } => {
            require_field(&field)?;
            store.add_option(&field, &value)
        }
        OptionsCommand::Remove { field, value } => store.remove_option(&field, &value),
        OptionsCommand::Rename { field, old, new } => store.update_option(&field, &old, &new),
    };
    if !changed {
        eprintln!("options unchanged");
    }
    Ok(0)
}

fn run_preset(workspace: &Workspace, command: PresetCommand) -> Result<i32> {
    let store = &workspace.presets;
    match command {
        PresetCommand::List => {
            for entry in store.list_presets() {
                println!("{:<32} {}", entry.name, entry.modified_label());
            }
        }
        PresetCommand::Show { name } => {
            println!("{}", document_text(&workspace.load_preset(&name)?));
        }
        PresetCommand::Delete { name } => {
            if !store.delete(&name) {
                bail!("could not delete preset '{name}'");
            }
        }
        PresetCommand::Rename { old, new } => {
            if !store.rename(&old, &new) {
                bail!("could not rename preset '{old}' to '{new}'");
            }
        }
    }
    Ok(0)
}

fn run_compose(workspace: &Workspace, args: ComposeArgs) -> Result<i32> {
    let mut form = FormModel::new();
    if let Some(name) = args.preset.as_deref() {
        apply_document(&mut form, &workspace.load_preset(name)?)?;
    }
    apply_compose_args(&mut form, &args)?;

    let document = to_document(&form);
    println!("{}", document_text(&document));
    if form.frame_enabled() {
        if let Some(preset) = matching_preset(&form.frame()) {
            eprintln!("frame matches the '{}' preset", preset.name);
        }
    }
    if let Some(name) = args.save_as.as_deref() {
        let saved = workspace.save_preset(name, &document)?;
        eprintln!("saved preset '{saved}'");
    }
    Ok(0)
}

fn apply_compose_args(form: &mut FormModel, args: &ComposeArgs) -> Result<()> {
    if args.clear {
        form.clear();
    }
    for assignment in &args.sets {
        let (field, value) = parse_assignment(assignment)?;
        form.set_value(field, value)?;
    }
    for assignment in &args.selects {
        let (field, item) = parse_assignment(assignment)?;
        form.toggle_selected(field, item)?;
    }

    if let Some(name) = args.frame_preset.as_deref() {
        let preset = frame_preset(name).with_context(|| {
            let known: Vec<&str> = FRAME_PRESETS.iter().map(|preset| preset.name).collect();
            format!("unknown frame preset '{name}' (expected one of {})", known.join(", "))
        })?;
        form.set_frame(&FrameSettings::from_preset(preset));
        form.set_frame_enabled(true);
    } else if args.ratio.is_some() || args.resolution.is_some() || args.usage.is_some() {
        let current = form.frame();
        form.set_frame(&FrameSettings::new(
            args.ratio.as_deref().unwrap_or(&current.ratio),
            args.resolution.as_deref().unwrap_or(&current.resolution),
            args.usage.as_deref().unwrap_or(&current.usage),
        ));
        form.set_frame_enabled(true);
    }
    if args.no_frame {
        form.set_frame_enabled(false);
    }

    if args.negative {
        form.set_negative_enabled(true);
    } else if args.no_negative {
        form.set_negative_enabled(false);
    }
    Ok(())
}

fn run_ai(workspace: &Workspace, command: AiCommand) -> Result<i32> {
    let mut slot = TextTaskSlot::from_config(&workspace.provider_config());
    let (mut form, before, events, save_as) = match command {
        AiCommand::Generate {
            description,
            save_as,
        } => {
            let events = start_text_task(slot.start_generate(&description))?;
            (FormModel::new(), None, events, save_as)
        }
        AiCommand::Modify {
            preset,
            instruction,
            save_as,
        } => {
            let mut form = FormModel::new();
            apply_document(&mut form, &workspace.load_preset(&preset)?)?;
            let before = to_document(&form);
            let events = start_text_task(slot.start_modify(&document_text(&before), &instruction))?;
            (form, Some(before), events, save_as)
        }
    };

    let full_text = match consume_text_events(&events)? {
        TextOutcome::Completed(text) => text,
        TextOutcome::Failed(err) => {
            eprintln!("AI request failed: {err}");
            return Ok(1);
        }
        TextOutcome::Cancelled => {
            eprintln!("AI request cancelled");
            return Ok(1);
        }
    };

    let document = match parse_ai_document(&full_text) {
        Ok(document) => document,
        Err(err) => {
            eprintln!("AI response is not a prompt document ({err}); raw text follows:");
            eprintln!("{full_text}");
            return Ok(2);
        }
    };
    apply_document(&mut form, &document)?;
    let merged = to_document(&form);
    if let Some(before) = before.as_ref() {
        for line in change_lines(before, &merged) {
            eprintln!("{line}");
        }
    }

    println!("{}", document_text(&merged));
    if let Some(name) = save_as.as_deref() {
        let saved = workspace.save_preset(name, &merged)?;
        eprintln!("saved preset '{saved}'");
    }
    Ok(0)
}

/// One line per changed path, or a single line saying nothing changed.
fn change_lines(before: &Value, after: &Value) -> Vec<String> {
    let changes = diff_documents(before, after);
    if changes.is_empty() {
        return vec!["no fields changed".to_string()];
    }
    let mut lines = vec![format!("{} field(s) changed:", changes.len())];
    lines.extend(changes.iter().map(|change| format!("  {change}")));
    lines
}

fn start_text_task(
    started: std::result::Result<Receiver<TextTaskEvent>, TaskError>,
) -> Result<Receiver<TextTaskEvent>> {
    started.map_err(|err| match err {
        TaskError::NotConfigured(_) => anyhow::anyhow!(
            "{err}; run `promptsmith config set --api-key ...` or set PROMPTSMITH_API_KEY"
        ),
        other => anyhow::Error::new(other),
    })
}

#[derive(Debug, PartialEq, Eq)]
enum TextOutcome {
    Completed(String),
    Failed(TaskError),
    Cancelled,
}

/// Streams chunks to stdout as they arrive; status goes to stderr.
fn consume_text_events(events: &Receiver<TextTaskEvent>) -> Result<TextOutcome> {
    let mut transcript = StreamTranscript::new();
    let mut outcome = None;
    let mut stdout = io::stdout();
    for event in events.iter() {
        match event {
            TextTaskEvent::Progress(message) => eprintln!("{message}"),
            TextTaskEvent::Chunk(chunk) => {
                transcript.push(&chunk);
                write!(stdout, "{chunk}")?;
                stdout.flush()?;
            }
            TextTaskEvent::Completed(full_text) => {
                writeln!(stdout)?;
                transcript.finish(&full_text);
                outcome = Some(TextOutcome::Completed(full_text));
            }
            TextTaskEvent::Failed(err) => outcome = Some(TextOutcome::Failed(err)),
            TextTaskEvent::Cancelled => outcome = Some(TextOutcome::Cancelled),
            TextTaskEvent::Finished => break,
        }
    }
    outcome.context("AI task ended without reporting an outcome")
}

fn run_image(workspace: &Workspace, args: ImageArgs) -> Result<i32> {
    let mut form = FormModel::new();
    apply_document(&mut form, &workspace.load_preset(&args.preset)?)?;
    let prompt_text = document_text(&to_document(&form));
    let request = ImageGenerateRequest::new(prompt_text, args.references, &args.aspect, &args.size)
        .with_context(|| {
            format!(
                "aspect must be one of {} and size one of {}",
                ASPECT_RATIOS.join(", "),
                IMAGE_SIZES.join(", ")
            )
        })?;

    let mut slot = ImageTaskSlot::from_config(&workspace.provider_config());
    let events = slot.start(request).map_err(|err| match err {
        TaskError::NotConfigured(_) => anyhow::anyhow!(
            "{err}; run `promptsmith config set --image-api-key ...` or set GEMINI_API_KEY"
        ),
        other => anyhow::Error::new(other),
    })?;

    let mut code = 1;
    for event in events.iter() {
        match event {
            ImageTaskEvent::Progress(message) => eprintln!("{message}"),
            ImageTaskEvent::ImageReady(image) => {
                let saved = save_image(&image.bytes, &args.out)?;
                println!("{}", saved.display());
                code = 0;
            }
            ImageTaskEvent::Failed(err) => eprintln!("image generation failed: {err}"),
            ImageTaskEvent::Cancelled => eprintln!("image generation cancelled"),
            ImageTaskEvent::Finished => break,
        }
    }
    Ok(code)
}

fn run_config(workspace: &Workspace, command: ConfigCommand) -> Result<i32> {
    let path = workspace.paths.config_file();
    match command {
        ConfigCommand::Show => {
            let config = workspace.provider_config();
            println!("file:           {}", path.display());
            println!("base_url:       {}", config.base_url);
            println!("api_key:        {}", mask_secret(&config.api_key));
            println!("model:          {}", config.model);
            println!("image_base_url: {}", config.image_base_url);
            println!("image_api_key:  {}", mask_secret(&config.image_api_key));
            println!("image_model:    {}", config.image_model);
            println!("text provider:  {}", configured_label(config.is_configured()));
            println!("image provider: {}", configured_label(config.is_image_configured()));
        }
        ConfigCommand::Set(args) => {
            let mut config = ProviderConfig::load_file(&path);
            apply_config_args(&mut config, args);
            config.save(&path)?;
            eprintln!("saved {}", path.display());
        }
    }
    Ok(0)
}

fn apply_config_args(config: &mut ProviderConfig, args: ConfigSetArgs) {
    let updates = [
        (&mut config.base_url, args.base_url),
        (&mut config.api_key, args.api_key),
        (&mut config.model, args.model),
        (&mut config.image_api_key, args.image_api_key),
        (&mut config.image_base_url, args.image_base_url),
        (&mut config.image_model, args.image_model),
    ];
    for (slot, value) in updates {
        if let Some(value) = value {
            *slot = value.trim().to_string();
        }
    }
}

fn require_field(name: &str) -> Result<()> {
    if field_spec(name).is_none() {
        bail!("unknown field '{name}'; see `promptsmith fields`");
    }
    Ok(())
}

fn parse_assignment(raw: &str) -> Result<(&str, &str)> {
    let Some((field, value)) = raw.split_once('=') else {
        bail!("expected FIELD=VALUE, got '{raw}'");
    };
    let field = field.trim();
    let Some(spec) = field_spec(field) else {
        bail!("unknown field '{field}'; see `promptsmith fields`");
    };
    if spec.kind == FieldKind::Frame {
        bail!("set frame values with --ratio, --resolution and --usage");
    }
    Ok((field, value))
}

fn mask_secret(secret: &str) -> String {
    let secret = secret.trim();
    if secret.is_empty() {
        return "(not set)".to_string();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}…")
}

fn configured_label(configured: bool) -> &'static str {
    if configured {
        "configured"
    } else {
        "missing API key"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use promptsmith_contracts::config::ProviderConfig;
    use promptsmith_contracts::form::FormModel;
    use promptsmith_engine::{ProviderError, TaskError, TextTaskEvent};
    use serde_json::json;

    use super::{
        apply_compose_args, apply_config_args, change_lines, configured_label,
        consume_text_events, mask_secret, parse_assignment, ComposeArgs, ConfigSetArgs,
        TextOutcome,
    };

    fn compose_args() -> ComposeArgs {
        ComposeArgs {
            preset: None,
            clear: false,
            sets: Vec::new(),
            selects: Vec::new(),
            frame_preset: None,
            ratio: None,
            resolution: None,
            usage: None,
            no_frame: false,
            negative: false,
            no_negative: false,
            save_as: None,
        }
    }

    #[test]
    fn assignments_split_on_first_equals() -> anyhow::Result<()> {
        assert_eq!(parse_assignment("mood=calm = serene")?, ("mood", "calm = serene"));
        assert!(parse_assignment("mood").is_err());
        assert!(parse_assignment("nope=x").is_err());
        assert!(parse_assignment("frame_ratio=16:9").is_err());
        Ok(())
    }

    #[test]
    fn compose_args_drive_the_form() -> anyhow::Result<()> {
        let mut form = FormModel::new();
        let mut args = compose_args();
        args.sets = vec!["mood=dreamy".to_string()];
        args.selects = vec![
            "forbidden_elements=text".to_string(),
            "forbidden_elements=watermark".to_string(),
        ];
        args.frame_preset = Some("Phone".to_string());
        args.negative = true;
        apply_compose_args(&mut form, &args)?;

        assert_eq!(form.value("mood"), "dreamy");
        assert_eq!(form.selected("forbidden_elements"), ["text", "watermark"]);
        assert!(form.frame_enabled());
        assert_eq!(form.frame().ratio, "9:16");
        assert!(form.negative_enabled());

        let mut partial = compose_args();
        partial.usage = Some("Poster".to_string());
        apply_compose_args(&mut form, &partial)?;
        assert_eq!(form.frame().ratio, "9:16");
        assert_eq!(form.frame().usage, "Poster");

        let mut off = compose_args();
        off.no_frame = true;
        off.clear = true;
        apply_compose_args(&mut form, &off)?;
        assert_eq!(form, FormModel::new());
        Ok(())
    }

    #[test]
    fn unknown_frame_preset_is_an_error() {
        let mut args = compose_args();
        args.frame_preset = Some("billboard".to_string());
        assert!(apply_compose_args(&mut FormModel::new(), &args).is_err());
    }

    #[test]
    fn text_events_reduce_to_one_outcome() -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel();
        for event in [
            TextTaskEvent::Progress("Connecting".to_string()),
            TextTaskEvent::Chunk("{}".to_string()),
            TextTaskEvent::Completed("{}".to_string()),
            TextTaskEvent::Finished,
        ] {
            tx.send(event)?;
        }
        assert_eq!(consume_text_events(&rx)?, TextOutcome::Completed("{}".to_string()));

        let (tx, rx) = mpsc::channel();
        tx.send(TextTaskEvent::Failed(TaskError::Provider(ProviderError::RateLimited)))?;
        tx.send(TextTaskEvent::Finished)?;
        assert_eq!(
            consume_text_events(&rx)?,
            TextOutcome::Failed(TaskError::Provider(ProviderError::RateLimited))
        );

        let (tx, rx) = mpsc::channel::<TextTaskEvent>();
        drop(tx);
        assert!(consume_text_events(&rx).is_err());
        Ok(())
    }

    #[test]
    fn config_set_only_touches_given_fields() {
        let mut config = ProviderConfig::default();
        apply_config_args(
            &mut config,
            ConfigSetArgs {
                base_url: None,
                api_key: Some(" sk-new ".to_string()),
                model: None,
                image_api_key: None,
                image_base_url: None,
                image_model: Some("gemini-other".to_string()),
            },
        );
        assert_eq!(config.api_key, "sk-new");
        assert_eq!(config.image_model, "gemini-other");
        assert_eq!(config.base_url, ProviderConfig::default().base_url);
    }

    #[test]
    fn modify_reports_changed_paths() {
        let before = json!({"mood": "calm", "camera": {"lens": "35mm"}});
        let after = json!({
            "mood": "stormy",
            "camera": {"lens": "35mm"},
            "frame_settings": {"ratio": "16:9"},
        });
        assert_eq!(
            change_lines(&before, &after),
            vec![
                "2 field(s) changed:".to_string(),
                "  ~ mood: calm -> stormy".to_string(),
                "  + frame_settings: [object]".to_string(),
            ]
        );
        assert_eq!(change_lines(&before, &before), vec!["no fields changed".to_string()]);
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret(""), "(not set)");
        assert_eq!(mask_secret("sk-abcdef"), "sk-a…");
    }

    #[test]
    fn config_show_reports_missing_keys() {
        let mut config = ProviderConfig::default();
        assert_eq!(configured_label(config.is_configured()), "missing API key");
        config.image_api_key = "g-key".to_string();
        assert_eq!(configured_label(config.is_image_configured()), "configured");
    }
}
