use clap::Parser;
use musicbox::{
    cli::{analysis_report, format_analysis, format_timeline, Args},
    config::Settings,
    engine::{SilentEngine, SynthEngine},
    events, logging,
    midi::decode_file,
    player::MidiPlayer,
    timeline::TimelineCompiler,
    transpose::TransposeAdvisor,
    ui::PlaybackUi,
};
use std::error::Error;

#[cfg(feature = "midi-output")]
use musicbox::engine::MidirEngine;

fn main() {
    let args = parse_command_line_arguments();

    let mut settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    if args.verbose {
        settings.logging.level = "debug".to_string();
    }
    initialize_logging(&settings);

    if let Err(e) = run(&args, &settings) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_command_line_arguments() -> Args {
    Args::parse()
}

fn initialize_logging(settings: &Settings) {
    if let Err(e) = logging::init_logger(&settings.logging) {
        eprintln!("Logger initialization failed: {}", e);
    }
    log::info!("Application starting");
}

fn run(args: &Args, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let document = decode_file(&args.file)?;
    log::info!(
        "Decoded {} ({} tracks, {} events)",
        args.file.display(),
        document.tracks.len(),
        document.event_count()
    );

    if args.report_only() {
        return report(args, settings, &document);
    }

    let engine = create_engine(args)?;
    let (events_tx, events_rx) = events::channel();
    let mut player = MidiPlayer::new(engine, settings.player_settings()?, events_tx);

    let song = player.open(&document)?;
    if let Some(analysis) = &song.analysis {
        println!("{}", format_analysis(analysis));
    }
    let transpose = args.transpose.unwrap_or(song.suggested_transpose);
    player.set_transpose(transpose);

    let ui = PlaybackUi::new(song.timeline.duration_ms(), settings.envelope());
    player.play();
    ui.run(&player, &events_rx);

    player.shutdown();
    log::info!("Application finished");
    Ok(())
}

fn report(
    args: &Args,
    settings: &Settings,
    document: &musicbox::midi::MidiDocument,
) -> Result<(), Box<dyn Error>> {
    let timeline = TimelineCompiler::new(settings.compile_policy()).compile(document)?;
    if args.timeline {
        println!("{}", format_timeline(&timeline));
    }
    if args.analyze {
        let advisor = TransposeAdvisor::new(settings.pitch_band()?);
        println!("{}", analysis_report(&advisor, &timeline)?);
    }
    Ok(())
}

#[cfg(feature = "midi-output")]
fn create_engine(args: &Args) -> Result<Box<dyn SynthEngine>, Box<dyn Error>> {
    match &args.midi_output {
        Some(device) => {
            let engine = match MidirEngine::connect(Some(device.as_str())) {
                Ok(engine) => engine,
                Err(e) => {
                    print_available_ports();
                    return Err(e.into());
                }
            };
            println!("Playing through MIDI output '{}'", device);
            Ok(Box::new(engine))
        }
        None => Ok(Box::new(SilentEngine::new())),
    }
}

#[cfg(feature = "midi-output")]
fn print_available_ports() {
    match MidirEngine::list_ports() {
        Ok(ports) if ports.is_empty() => eprintln!("No MIDI output ports found"),
        Ok(ports) => {
            eprintln!("Available MIDI output ports:");
            for port in ports {
                eprintln!("  {}", port);
            }
        }
        Err(e) => log::warn!("Could not list MIDI output ports: {}", e),
    }
}

#[cfg(not(feature = "midi-output"))]
fn create_engine(_args: &Args) -> Result<Box<dyn SynthEngine>, Box<dyn Error>> {
    Ok(Box::new(SilentEngine::new()))
}
