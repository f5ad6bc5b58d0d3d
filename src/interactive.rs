use crate::config::{language_name, Config, LANGUAGES};
use crate::pipeline::{derive_output_path, PipelineConfig};
use crate::voice::{ElevenLabsClient, Voice};
use console::style;
use dialoguer::{Confirm, FuzzySelect, Input, Select};
use std::fs;
use std::path::{Path, PathBuf};

const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi", "m4v"];

pub struct InteractiveResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub config: Config,
    pub pipeline_config: PipelineConfig,
}

pub async fn run_interactive_wizard() -> anyhow::Result<InteractiveResult> {
    print_header();

    // Step 1: Check/Setup API keys
    let config = setup_api_keys()?;

    // Step 2: Select source video
    let input = select_source_file()?;

    // Step 3: What should the narration explain?
    let goal = ask_goal()?;

    // Step 4: Narration language
    let default_lang = LANGUAGES
        .iter()
        .position(|(code, _)| *code == config.default_language)
        .unwrap_or(0);
    let language = select_language("Select narration language:", default_lang)?;

    // Step 5: Voice
    let voice_id = select_voice(&config).await?;

    let output = derive_output_path(&input);

    // Step 6: Resume only when asked to
    let resume = Confirm::new()
        .with_prompt("Reuse saved progress for this video if the inputs are unchanged?")
        .default(false)
        .interact()?;

    // Step 7: Confirm
    print_summary(&input, &output, &goal, &language, &voice_id);

    if !Confirm::new()
        .with_prompt("Proceed with these settings?")
        .default(true)
        .interact()?
    {
        anyhow::bail!("Cancelled by user");
    }

    println!();

    let pipeline_config = PipelineConfig {
        goal,
        language,
        voice_id,
        tts_model: config.tts_model.clone(),
        resume,
        show_progress: true,
    };

    Ok(InteractiveResult {
        input,
        output,
        config,
        pipeline_config,
    })
}

fn print_header() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║         voiceover - AI Video Narration            ║").cyan()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════════════════╝").cyan()
    );
    println!();
}

fn prompt_key(service: &str, hint: &str) -> anyhow::Result<String> {
    println!("{} {} API key not found", style("!").yellow(), service);
    println!("  {hint}\n");

    let api_key: String = Input::new()
        .with_prompt(format!("Enter your {service} API key"))
        .interact_text()?;

    if api_key.trim().is_empty() {
        anyhow::bail!("{service} API key is required");
    }
    Ok(api_key.trim().to_string())
}

fn setup_api_keys() -> anyhow::Result<Config> {
    let mut config = Config::load().unwrap_or_default();
    let mut changed = false;

    if config.gemini_api_key.as_deref().map_or(true, str::is_empty) {
        config.gemini_api_key = Some(prompt_key(
            "Gemini",
            "Get one at: https://aistudio.google.com/apikey",
        )?);
        changed = true;
    }
    if config.elevenlabs_api_key.as_deref().map_or(true, str::is_empty) {
        config.elevenlabs_api_key = Some(prompt_key(
            "ElevenLabs",
            "Get one at: https://elevenlabs.io/app/settings/api-keys",
        )?);
        changed = true;
    }

    if !changed {
        println!("{} API keys configured", style("✓").green());
        return Ok(config);
    }

    if Confirm::new()
        .with_prompt("Save API keys to config file?")
        .default(true)
        .interact()?
    {
        let path = config.save()?;
        println!(
            "{} API keys saved to {}\n",
            style("✓").green(),
            path.display()
        );
    }

    Ok(config)
}

fn ask_path() -> anyhow::Result<PathBuf> {
    let path: String = Input::new()
        .with_prompt("Enter video path")
        .interact_text()?;
    let path = PathBuf::from(path.trim());
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(path)
}

fn select_source_file() -> anyhow::Result<PathBuf> {
    println!("\n{}", style("Select source video:").bold());

    let files = scan_video_files(Path::new("."))?;

    if files.is_empty() {
        println!("  No videos found in current directory.\n");
        return ask_path();
    }

    let mut items: Vec<String> = files
        .iter()
        .map(|f| {
            let size = fs::metadata(f)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "?".to_string());
            format!("{} ({})", f.display(), size)
        })
        .collect();
    items.push("Enter custom path...".to_string());

    let selection = Select::new()
        .with_prompt("Choose a video")
        .items(&items)
        .default(0)
        .interact()?;

    if selection == files.len() {
        ask_path()
    } else {
        Ok(files[selection].clone())
    }
}

fn scan_video_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_file() {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                if SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                    files.push(path);
                }
            }
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn ask_goal() -> anyhow::Result<String> {
    let goal: String = Input::new()
        .with_prompt("What should the narration explain?")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Please describe what the viewer should learn")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    Ok(goal.trim().to_string())
}

fn select_language(prompt: &str, default: usize) -> anyhow::Result<String> {
    let mut options: Vec<String> = LANGUAGES
        .iter()
        .map(|(code, name)| format!("{} ({})", name, code))
        .collect();
    options.push("Other (enter code)...".to_string());

    let selection = Select::new()
        .with_prompt(prompt)
        .items(&options)
        .default(default)
        .interact()?;

    if selection == LANGUAGES.len() {
        let code: String = Input::new()
            .with_prompt("Enter language code (e.g., 'vi' for Vietnamese)")
            .interact_text()?;
        Ok(code.trim().to_lowercase())
    } else {
        Ok(LANGUAGES[selection].0.to_string())
    }
}

fn voice_label(voice: &Voice) -> String {
    let description = voice.describe();
    if description.is_empty() {
        voice.name.clone()
    } else {
        format!("{} - {}", voice.name, description)
    }
}

async fn select_voice(config: &Config) -> anyhow::Result<String> {
    let client = ElevenLabsClient::new(config.elevenlabs_api_key.clone().unwrap_or_default());

    let voices = match client.list_voices().await {
        Ok(voices) if !voices.is_empty() => voices,
        Ok(_) => {
            println!("{} No voices available, using default", style("!").yellow());
            return Ok(config.default_voice_id.clone());
        }
        Err(e) => {
            println!(
                "{} Could not fetch voices ({}), using default",
                style("!").yellow(),
                e
            );
            return Ok(config.default_voice_id.clone());
        }
    };

    let items: Vec<String> = voices.iter().map(voice_label).collect();
    let default = voices
        .iter()
        .position(|v| v.voice_id == config.default_voice_id)
        .unwrap_or(0);

    loop {
        let selection = FuzzySelect::new()
            .with_prompt("Select a voice (type to search)")
            .items(&items)
            .default(default)
            .interact()?;
        let voice = &voices[selection];

        if !Confirm::new()
            .with_prompt(format!("Preview {}?", voice.name))
            .default(false)
            .interact()?
        {
            return Ok(voice.voice_id.clone());
        }

        match client.preview(&voice.voice_id, None).await {
            Ok(audio) => {
                let path = std::env::temp_dir().join(format!("voice-preview-{}.mp3", voice.voice_id));
                fs::write(&path, audio)?;
                println!("  Sample saved to {}", style(path.display()).cyan());
            }
            Err(e) => println!("{} Preview failed: {}", style("!").yellow(), e),
        }

        if Confirm::new()
            .with_prompt(format!("Use {}?", voice.name))
            .default(true)
            .interact()?
        {
            return Ok(voice.voice_id.clone());
        }
    }
}

fn print_summary(input: &Path, output: &Path, goal: &str, language: &str, voice_id: &str) {
    println!("\n{}", style("═══ Summary ═══").bold());
    println!("  Input:     {}", style(input.display()).cyan());
    println!("  Output:    {}", style(output.display()).cyan());
    println!("  Goal:      {}", goal);
    println!("  Language:  {} ({})", language_name(language), language);
    println!("  Voice:     {}", voice_id);
    println!();
}
