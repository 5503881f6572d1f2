//! Line-based command parser for the console front end

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use vinyl_core::{DeckId, EqBand, RecordSource, SlotId};

/// One parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    // Decks
    Load { deck: DeckId, path: PathBuf, bpm: f64, key: String },
    Unload(DeckId),
    Play(DeckId),
    Pause(DeckId),
    Toggle(DeckId),
    Cue(DeckId),
    Seek { deck: DeckId, seconds: f64 },
    Volume { deck: DeckId, volume: f32 },
    Gain { deck: DeckId, gain: f32 },
    Eq { deck: DeckId, band: EqBand, gain_db: f32 },
    Pitch { deck: DeckId, percent: f64 },
    Sync { source: DeckId, target: DeckId },

    // Bus
    Crossfader(f32),
    MasterVolume(f32),
    CueVolume(f32),
    Listen { deck: DeckId, enabled: bool },

    // Sampler
    Record { slot: SlotId, source: RecordSource },
    StopRecording,
    Sample { slot: SlotId, path: PathBuf },
    Pad { slot: SlotId, looping: bool },
    StopPad(SlotId),
    StopAllPads,
    PadVolume { slot: SlotId, volume: f32 },
    SamplerVolume(f32),
    Clear(SlotId),

    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
decks:   load <a|b> <path> <bpm> [key] | unload <deck> | play|pause|toggle|cue <deck>
         seek <deck> <sec> | vol <deck> <0-1> | gain <deck> <0-1>
         eq <deck> <low|mid|high> <dB> | pitch <deck> <%> | sync <source> <target>
bus:     xfade <0-100> | master <0-100> | cuevol <0-100> | listen <deck> <on|off>
sampler: rec <1-8> <mic|master> | stoprec | sample <1-8> <path>
         pad <1-8> [loop] | stop <1-8> | stopall | padvol <1-8> <0-100>
         samplervol <0-100> | clear <1-8>
other:   status | help | quit";

/// Parse a console line; blank lines yield `None`
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let arg = |i: usize| {
        args.get(i)
            .copied()
            .ok_or_else(|| anyhow!("'{}' is missing argument {}", verb, i + 1))
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "load" => ConsoleCommand::Load {
            deck: deck(arg(0)?)?,
            path: PathBuf::from(arg(1)?),
            bpm: number(arg(2)?)?,
            key: args.get(3).copied().unwrap_or("").to_string(),
        },
        "unload" => ConsoleCommand::Unload(deck(arg(0)?)?),
        "play" => ConsoleCommand::Play(deck(arg(0)?)?),
        "pause" => ConsoleCommand::Pause(deck(arg(0)?)?),
        "toggle" => ConsoleCommand::Toggle(deck(arg(0)?)?),
        "cue" => ConsoleCommand::Cue(deck(arg(0)?)?),
        "seek" => ConsoleCommand::Seek {
            deck: deck(arg(0)?)?,
            seconds: number(arg(1)?)?,
        },
        "vol" => ConsoleCommand::Volume {
            deck: deck(arg(0)?)?,
            volume: number(arg(1)?)?,
        },
        "gain" => ConsoleCommand::Gain {
            deck: deck(arg(0)?)?,
            gain: number(arg(1)?)?,
        },
        "eq" => ConsoleCommand::Eq {
            deck: deck(arg(0)?)?,
            band: band(arg(1)?)?,
            gain_db: number(arg(2)?)?,
        },
        "pitch" => ConsoleCommand::Pitch {
            deck: deck(arg(0)?)?,
            percent: number(arg(1)?)?,
        },
        "sync" => ConsoleCommand::Sync {
            source: deck(arg(0)?)?,
            target: deck(arg(1)?)?,
        },
        "xfade" => ConsoleCommand::Crossfader(number(arg(0)?)?),
        "master" => ConsoleCommand::MasterVolume(number(arg(0)?)?),
        "cuevol" => ConsoleCommand::CueVolume(number(arg(0)?)?),
        "listen" => ConsoleCommand::Listen {
            deck: deck(arg(0)?)?,
            enabled: switch(arg(1)?)?,
        },
        "rec" => ConsoleCommand::Record {
            slot: slot(arg(0)?)?,
            source: source(arg(1)?)?,
        },
        "stoprec" => ConsoleCommand::StopRecording,
        "sample" => ConsoleCommand::Sample {
            slot: slot(arg(0)?)?,
            path: PathBuf::from(arg(1)?),
        },
        "pad" => ConsoleCommand::Pad {
            slot: slot(arg(0)?)?,
            looping: match args.get(1) {
                None => false,
                Some(word) if word.eq_ignore_ascii_case("loop") => true,
                Some(word) => bail!("expected 'loop', got '{}'", word),
            },
        },
        "stop" => ConsoleCommand::StopPad(slot(arg(0)?)?),
        "stopall" => ConsoleCommand::StopAllPads,
        "padvol" => ConsoleCommand::PadVolume {
            slot: slot(arg(0)?)?,
            volume: number(arg(1)?)?,
        },
        "samplervol" => ConsoleCommand::SamplerVolume(number(arg(0)?)?),
        "clear" => ConsoleCommand::Clear(slot(arg(0)?)?),
        "status" | "s" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => bail!("unknown command '{}' (try 'help')", other),
    };
    Ok(Some(command))
}

fn deck(word: &str) -> Result<DeckId> {
    match word.to_ascii_lowercase().as_str() {
        "a" | "1" => Ok(DeckId::A),
        "b" | "2" => Ok(DeckId::B),
        _ => bail!("unknown deck '{}' (expected a or b)", word),
    }
}

fn slot(word: &str) -> Result<SlotId> {
    let number: u8 = word
        .parse()
        .with_context(|| format!("'{}' is not a slot number", word))?;
    Ok(SlotId::new(number)?)
}

fn band(word: &str) -> Result<EqBand> {
    match word.to_ascii_lowercase().as_str() {
        "low" | "lo" => Ok(EqBand::Low),
        "mid" => Ok(EqBand::Mid),
        "high" | "hi" => Ok(EqBand::High),
        _ => bail!("unknown EQ band '{}'", word),
    }
}

fn source(word: &str) -> Result<RecordSource> {
    match word.to_ascii_lowercase().as_str() {
        "mic" | "microphone" => Ok(RecordSource::Microphone),
        "master" => Ok(RecordSource::MasterBusOutput),
        _ => bail!("unknown record source '{}' (expected mic or master)", word),
    }
}

fn switch(word: &str) -> Result<bool> {
    match word.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        _ => bail!("expected on or off, got '{}'", word),
    }
}

fn number<T: std::str::FromStr>(word: &str) -> Result<T> {
    word.parse()
        .map_err(|_| anyhow!("'{}' is not a number", word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(line: &str) -> ConsoleCommand {
        parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_deck_commands() {
        assert_eq!(parsed("play a"), ConsoleCommand::Play(DeckId::A));
        assert_eq!(parsed("PAUSE B"), ConsoleCommand::Pause(DeckId::B));
        assert_eq!(
            parsed("seek b 12.5"),
            ConsoleCommand::Seek {
                deck: DeckId::B,
                seconds: 12.5
            }
        );
        assert_eq!(
            parsed("eq a hi -6"),
            ConsoleCommand::Eq {
                deck: DeckId::A,
                band: EqBand::High,
                gain_db: -6.0
            }
        );
        assert_eq!(
            parsed("sync a b"),
            ConsoleCommand::Sync {
                source: DeckId::A,
                target: DeckId::B
            }
        );
    }

    #[test]
    fn test_load_with_optional_key() {
        assert_eq!(
            parsed("load a /music/track.flac 128"),
            ConsoleCommand::Load {
                deck: DeckId::A,
                path: PathBuf::from("/music/track.flac"),
                bpm: 128.0,
                key: String::new(),
            }
        );
        match parsed("load b x.wav 124 8A") {
            ConsoleCommand::Load { key, .. } => assert_eq!(key, "8A"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sampler_commands() {
        let three = SlotId::new(3).unwrap();
        assert_eq!(
            parsed("rec 3 mic"),
            ConsoleCommand::Record {
                slot: three,
                source: RecordSource::Microphone
            }
        );
        assert_eq!(
            parsed("pad 3 loop"),
            ConsoleCommand::Pad {
                slot: three,
                looping: true
            }
        );
        assert_eq!(
            parsed("pad 3"),
            ConsoleCommand::Pad {
                slot: three,
                looping: false
            }
        );
        assert_eq!(parsed("stopall"), ConsoleCommand::StopAllPads);
        assert_eq!(
            parsed("listen b on"),
            ConsoleCommand::Listen {
                deck: DeckId::B,
                enabled: true
            }
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse("play c").is_err());
        assert!(parse("pad 9").is_err());
        assert!(parse("pad 0").is_err());
        assert!(parse("seek a").is_err());
        assert!(parse("xfade loud").is_err());
        assert!(parse("rec 1 radio").is_err());
        assert!(parse("dance").is_err());
    }
}
