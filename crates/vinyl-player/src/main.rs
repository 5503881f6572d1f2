//! Vinyl Player - console front end for the two-deck engine
//!
//! Starts the audio system, then reads commands from stdin (`help` lists
//! them) while forwarding background loads and printing engine events.
//!
//! ## Command line
//!
//! ```text
//! vinyl-player [--config PATH] [--no-mic] [--bpm-a BPM] [--bpm-b BPM] [TRACK_A] [TRACK_B]
//! ```

mod console;

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use vinyl_core::audio::{start_audio_system, AudioSystem};
use vinyl_core::audio_file::{load_track, DecodeError, Track};
use vinyl_core::config::{default_config_path, load_config, VinylConfig};
use vinyl_core::engine::{EngineEvent, SlotActivity, SyncOutcome};
use vinyl_core::{DeckId, EngineController};

use console::{ConsoleCommand, HELP};

/// How often the main loop wakes up without input
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// BPM assumed for tracks given on the command line without `--bpm-*`
const DEFAULT_TRACK_BPM: f64 = 120.0;

type TrackLoad = (DeckId, Result<Track, DecodeError>);

struct Args {
    config_path: Option<PathBuf>,
    no_mic: bool,
    tracks: Vec<PathBuf>,
    bpm: [f64; 2],
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args {
        config_path: None,
        no_mic: false,
        tracks: Vec::new(),
        bpm: [DEFAULT_TRACK_BPM; 2],
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                parsed.config_path = Some(args.next().context("--config needs a path")?.into());
            }
            "--no-mic" => parsed.no_mic = true,
            "--bpm-a" | "--bpm-b" => {
                let value = args.next().with_context(|| format!("{} needs a value", arg))?;
                let bpm: f64 = value
                    .parse()
                    .with_context(|| format!("invalid BPM '{}'", value))?;
                parsed.bpm[if arg == "--bpm-a" { 0 } else { 1 }] = bpm;
            }
            flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
            path => parsed.tracks.push(PathBuf::from(path)),
        }
    }
    if parsed.tracks.len() > 2 {
        bail!("at most two tracks (deck A and deck B)");
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    log::info!("vinyl-player starting up");

    let config_path = args.config_path.clone().unwrap_or_else(default_config_path);
    let mut config: VinylConfig = load_config(&config_path);
    if args.no_mic {
        config.audio.enable_microphone = false;
    }

    // Decoding runs on the rayon pool; build it before audio starts
    rayon::ThreadPoolBuilder::new()
        .num_threads(2)
        .thread_name(|i| format!("rayon-decode-{}", i))
        .build_global()
        .context("Failed to initialize Rayon thread pool")?;

    let mut system = start_audio_system(&config).context("Failed to start audio")?;
    println!(
        "Audio running: {}Hz, {} frames (~{:.1}ms), microphone {}",
        system.sample_rate,
        system.buffer_size,
        system.latency_ms,
        if system.controller.microphone_available() { "ready" } else { "unavailable" }
    );
    println!("Type 'help' for commands.");

    let (track_tx, track_rx) = channel::unbounded::<TrackLoad>();
    for (deck, path) in DeckId::ALL.into_iter().zip(&args.tracks) {
        spawn_track_load(&track_tx, deck, path.clone(), args.bpm[deck.index()], String::new());
    }

    let lines = spawn_stdin_reader();
    loop {
        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => match console::parse(&line) {
                Ok(Some(ConsoleCommand::Quit)) => break,
                Ok(Some(command)) => {
                    if let Err(e) = execute(command, &mut system, &track_tx) {
                        println!("error: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => println!("error: {}", e),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        forward_tracks(&track_rx, &mut system.controller);
        system.controller.poll_loads();
        while let Ok(event) = system.events.try_recv() {
            system.controller.handle_event(&event);
            report(&event);
        }
    }

    log::info!("vinyl-player shutting down");
    Ok(())
}

/// Read stdin lines on a separate thread
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = channel::unbounded();
    let spawned = std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        log::error!("Failed to spawn stdin reader: {}", e);
    }
    rx
}

fn spawn_track_load(tx: &Sender<TrackLoad>, deck: DeckId, path: PathBuf, bpm: f64, key: String) {
    let tx = tx.clone();
    println!("Loading {} on deck {}...", path.display(), deck);
    rayon::spawn(move || {
        let _ = tx.send((deck, load_track(&path, bpm, &key)));
    });
}

fn forward_tracks(rx: &Receiver<TrackLoad>, controller: &mut EngineController) {
    while let Ok((deck, result)) = rx.try_recv() {
        match result {
            Ok(track) => {
                let name = track.name.clone();
                match controller.load_track(deck, track.into_shared()) {
                    Ok(()) => println!("Deck {}: loaded '{}'", deck, name),
                    Err(e) => println!("Deck {}: {}", deck, e),
                }
            }
            Err(e) => println!("Deck {}: load failed: {}", deck, e),
        }
    }
}

fn execute(
    command: ConsoleCommand,
    system: &mut AudioSystem,
    track_tx: &Sender<TrackLoad>,
) -> Result<()> {
    let c = &mut system.controller;
    match command {
        ConsoleCommand::Load {
            deck,
            path,
            bpm,
            key,
        } => spawn_track_load(track_tx, deck, path, bpm, key),
        ConsoleCommand::Unload(deck) => c.unload_track(deck)?,
        ConsoleCommand::Play(deck) => c.play(deck)?,
        ConsoleCommand::Pause(deck) => c.pause(deck)?,
        ConsoleCommand::Toggle(deck) => c.toggle_play(deck)?,
        ConsoleCommand::Cue(deck) => c.cue(deck)?,
        ConsoleCommand::Seek { deck, seconds } => c.seek(deck, seconds)?,
        ConsoleCommand::Volume { deck, volume } => c.set_volume(deck, volume)?,
        ConsoleCommand::Gain { deck, gain } => c.set_gain(deck, gain)?,
        ConsoleCommand::Eq {
            deck,
            band,
            gain_db,
        } => c.set_eq(deck, band, gain_db)?,
        ConsoleCommand::Pitch { deck, percent } => c.set_pitch(deck, percent)?,
        ConsoleCommand::Sync { source, target } => match c.sync_to(source, target)? {
            SyncOutcome::AlreadyInSync => println!("Decks already in sync"),
            SyncOutcome::Adjusted { pitch_percent } => {
                println!("Deck {} pitch set to {:+.2}%", target, pitch_percent)
            }
        },
        ConsoleCommand::Crossfader(position) => c.set_crossfader(position)?,
        ConsoleCommand::MasterVolume(volume) => c.set_master_volume(volume)?,
        ConsoleCommand::CueVolume(volume) => c.set_cue_volume(volume)?,
        ConsoleCommand::Listen { deck, enabled } => c.set_cue_listen(deck, enabled)?,
        ConsoleCommand::Record { slot, source } => c.start_recording(slot, source)?,
        ConsoleCommand::StopRecording => c.stop_recording()?,
        ConsoleCommand::Sample { slot, path } => c.load_sample_file(slot, &path)?,
        ConsoleCommand::Pad { slot, looping } => c.play_slot(slot, looping)?,
        ConsoleCommand::StopPad(slot) => c.stop_slot(slot)?,
        ConsoleCommand::StopAllPads => c.stop_all_slots()?,
        ConsoleCommand::PadVolume { slot, volume } => c.set_slot_volume(slot, volume)?,
        ConsoleCommand::SamplerVolume(volume) => c.set_sampler_volume(volume)?,
        ConsoleCommand::Clear(slot) => c.clear_slot(slot)?,
        ConsoleCommand::Status => print_status(c),
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

fn report(event: &EngineEvent) {
    match event {
        EngineEvent::TrackEnded { deck } => println!("Deck {}: track ended", deck),
        EngineEvent::SlotPlaybackEnded { slot } => log::debug!("Slot {} finished", slot),
        EngineEvent::RecordingFinished(finished) => match &finished.buffer {
            Some(buffer) => println!(
                "Slot {}: recorded {:.2}s{}",
                finished.slot,
                buffer.duration_seconds(),
                if finished.truncated { " (truncated)" } else { "" }
            ),
            None => println!("Slot {}: nothing recorded", finished.slot),
        },
        EngineEvent::SampleLoaded { slot, .. } => println!("Slot {}: sample ready", slot),
        EngineEvent::SampleLoadFailed { slot, error } => {
            println!("Slot {}: load failed: {}", slot, error)
        }
        EngineEvent::StaleSampleDiscarded { slot } => log::debug!("Slot {}: stale load dropped", slot),
        EngineEvent::CommandRejected { command, error } => {
            println!("{} rejected: {}", command, error)
        }
    }
}

fn print_status(c: &EngineController) {
    for deck in DeckId::ALL {
        let s = c.deck_snapshot(deck);
        let bpm = s
            .display_bpm
            .map(|b| b.to_string())
            .unwrap_or_else(|| "---".to_string());
        println!(
            "Deck {} {:<24} {:?} {:>6.1}/{:<6.1}s {} BPM pitch {:+.1}% vol {:.2} gain {:.2} eq {:+.0}/{:+.0}/{:+.0}",
            deck,
            s.track_name.as_deref().unwrap_or("(empty)"),
            s.state,
            s.position_seconds,
            s.duration_seconds,
            bpm,
            s.pitch_percent,
            s.volume,
            s.gain,
            s.eq_low,
            s.eq_mid,
            s.eq_high,
        );
    }

    let bus = c.bus_snapshot();
    println!(
        "Bus    xfade {:.0} (A {:.2} / B {:.2}) master {:.0} cue {:.0} listen A:{} B:{}",
        bus.crossfader,
        bus.gain_a,
        bus.gain_b,
        bus.master_volume,
        bus.cue_volume,
        bus.cue_listen[0],
        bus.cue_listen[1],
    );

    if let Some(sync) = c.sync_status() {
        println!(
            "Sync   diff {:.2} BPM, accuracy {:.0}%{}",
            sync.bpm_difference,
            sync.accuracy_percent,
            if sync.in_sync { " (in sync)" } else { "" }
        );
    }

    let sampler = c.sampler_snapshot();
    println!("Sampler volume {:.0}", sampler.master_volume);
    for slot in &sampler.slots {
        let activity = match slot.activity {
            SlotActivity::Idle => String::new(),
            SlotActivity::Recording(_) => format!("REC {:.1}s", sampler.recorded_seconds),
            SlotActivity::Playing { looping: true } => "looping".to_string(),
            SlotActivity::Playing { looping: false } => "playing".to_string(),
        };
        println!(
            "  [{}] {:<16} {:>5.2}s vol {:>3.0} {}",
            slot.slot,
            slot.name,
            slot.duration_seconds,
            slot.volume,
            activity
        );
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["--bpm-b", "124", "a.flac", "--no-mic", "b.flac"]).unwrap();
        assert!(parsed.no_mic);
        assert_eq!(parsed.bpm, [DEFAULT_TRACK_BPM, 124.0]);
        assert_eq!(parsed.tracks, vec![PathBuf::from("a.flac"), PathBuf::from("b.flac")]);
        assert!(parsed.config_path.is_none());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(args(&["--bpm-a"]).is_err());
        assert!(args(&["--bpm-a", "fast"]).is_err());
        assert!(args(&["--volume"]).is_err());
        assert!(args(&["1.wav", "2.wav", "3.wav"]).is_err());
    }
}
