//! Command definitions and line parsing for the mixdown shell

use mixdown_audio::{AudioCommand, TrackId};
use std::path::PathBuf;
use thiserror::Error;

/// Which tracks a transport command applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Track(TrackId),
    All,
}

/// Commands that can be entered at the prompt
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(PathBuf),
    List,
    Play(Target),
    Pause(Target),
    Resume(Target),
    Stop(TrackId),
    Gain(TrackId, f32),
    Remove(TrackId),
    /// Export to the given path, or the configured default
    Export(Option<PathBuf>),
    Help,
    Quit,
}

impl Command {
    /// Engine command for transport and track edits; `None` for shell-level commands
    pub fn to_audio_command(&self) -> Option<AudioCommand> {
        match *self {
            Command::Play(Target::Track(id)) => Some(AudioCommand::Play(id)),
            Command::Play(Target::All) => Some(AudioCommand::PlayAll),
            Command::Pause(Target::Track(id)) => Some(AudioCommand::Pause(id)),
            Command::Pause(Target::All) => Some(AudioCommand::PauseAll),
            Command::Resume(Target::Track(id)) => Some(AudioCommand::Resume(id)),
            Command::Resume(Target::All) => Some(AudioCommand::ResumeAll),
            Command::Stop(id) => Some(AudioCommand::Stop(id)),
            Command::Gain(id, gain) => Some(AudioCommand::SetGain(id, gain)),
            Command::Remove(id) => Some(AudioCommand::Remove(id)),
            Command::Load(_)
            | Command::List
            | Command::Export(_)
            | Command::Help
            | Command::Quit => None,
        }
    }
}

/// Errors from parsing a command line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("'{0}' needs {1}")]
    MissingArgument(&'static str, &'static str),
    #[error("'{0}' is not a track id")]
    InvalidTrack(String),
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
    #[error("unexpected argument '{0}'")]
    Unexpected(String),
}

/// Shown by `help`
pub const HELP: &str = "\
commands:
  load PATH            decode a file and add it as a track
  list                 show tracks with position, gain and state
  play ID|all          play from the start
  pause ID|all         pause, remembering the position
  resume ID|all        continue from the paused position
  stop ID              stop and forget the position
  gain ID VALUE        set gain (0.0 - 10.0)
  remove ID            drop a track
  export [PATH]        mix every track down to a WAV file
  help                 this text
  quit                 leave";

/// Parse one input line
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let input = line.trim();
    let (name, rest) = match input.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (input, ""),
    };

    match name {
        "" => Err(ParseError::Empty),
        "q" | "quit" | "exit" => no_args(rest, Command::Quit),
        "help" | "?" => no_args(rest, Command::Help),
        "list" | "ls" => no_args(rest, Command::List),
        "load" => {
            let path = unquote(rest);
            if path.is_empty() {
                return Err(ParseError::MissingArgument("load", "a path"));
            }
            Ok(Command::Load(path.into()))
        }
        "play" => Ok(Command::Play(target("play", rest)?)),
        "pause" => Ok(Command::Pause(target("pause", rest)?)),
        "resume" => Ok(Command::Resume(target("resume", rest)?)),
        "stop" => Ok(Command::Stop(single_track("stop", rest)?)),
        "remove" | "rm" => Ok(Command::Remove(single_track("remove", rest)?)),
        "gain" => {
            let mut args = rest.split_whitespace();
            let id = args
                .next()
                .ok_or(ParseError::MissingArgument("gain", "a track id"))
                .and_then(track_id)?;
            let value = args
                .next()
                .ok_or(ParseError::MissingArgument("gain", "a value"))?;
            let gain = value
                .parse::<f32>()
                .map_err(|_| ParseError::InvalidNumber(value.to_string()))?;
            if let Some(extra) = args.next() {
                return Err(ParseError::Unexpected(extra.to_string()));
            }
            Ok(Command::Gain(id, gain))
        }
        "export" => {
            let path = unquote(rest);
            Ok(Command::Export((!path.is_empty()).then(|| path.into())))
        }
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

fn no_args(rest: &str, command: Command) -> Result<Command, ParseError> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(ParseError::Unexpected(rest.to_string()))
    }
}

fn track_id(arg: &str) -> Result<TrackId, ParseError> {
    arg.parse::<u64>()
        .map(TrackId::new)
        .map_err(|_| ParseError::InvalidTrack(arg.to_string()))
}

fn single_track(command: &'static str, rest: &str) -> Result<TrackId, ParseError> {
    if rest.is_empty() {
        return Err(ParseError::MissingArgument(command, "a track id"));
    }
    track_id(rest)
}

fn target(command: &'static str, rest: &str) -> Result<Target, ParseError> {
    match rest {
        "" => Err(ParseError::MissingArgument(command, "a track id or 'all'")),
        "all" | "*" => Ok(Target::All),
        id => track_id(id).map(Target::Track),
    }
}

/// Remove surrounding quotes if present
fn unquote(path: &str) -> &str {
    let path = path.trim();
    if path.len() >= 2
        && ((path.starts_with('\'') && path.ends_with('\''))
            || (path.starts_with('"') && path.ends_with('"')))
    {
        &path[1..path.len() - 1]
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_commands() {
        assert_eq!(
            parse_command("play 0"),
            Ok(Command::Play(Target::Track(TrackId::new(0))))
        );
        assert_eq!(parse_command("pause all"), Ok(Command::Pause(Target::All)));
        assert_eq!(
            parse_command("  resume   3 "),
            Ok(Command::Resume(Target::Track(TrackId::new(3))))
        );
        assert_eq!(parse_command("stop 2"), Ok(Command::Stop(TrackId::new(2))));
    }

    #[test]
    fn test_gain() {
        assert_eq!(
            parse_command("gain 1 0.5"),
            Ok(Command::Gain(TrackId::new(1), 0.5))
        );
        assert_eq!(
            parse_command("gain 1"),
            Err(ParseError::MissingArgument("gain", "a value"))
        );
        assert_eq!(
            parse_command("gain x 1"),
            Err(ParseError::InvalidTrack("x".into()))
        );
        assert_eq!(
            parse_command("gain 1 loud"),
            Err(ParseError::InvalidNumber("loud".into()))
        );
        // Range is the engine's call, not the parser's
        assert_eq!(
            parse_command("gain 0 15"),
            Ok(Command::Gain(TrackId::new(0), 15.0))
        );
    }

    #[test]
    fn test_paths_with_quotes() {
        assert_eq!(
            parse_command("load '/music/my song.mp3'"),
            Ok(Command::Load("/music/my song.mp3".into()))
        );
        assert_eq!(
            parse_command("load /music/my song.mp3"),
            Ok(Command::Load("/music/my song.mp3".into()))
        );
        assert_eq!(parse_command("export"), Ok(Command::Export(None)));
        assert_eq!(
            parse_command("export \"out dir/mix.wav\""),
            Ok(Command::Export(Some("out dir/mix.wav".into())))
        );
        assert_eq!(
            parse_command("load"),
            Err(ParseError::MissingArgument("load", "a path"))
        );
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("q"), Ok(Command::Quit));
        assert_eq!(parse_command("list"), Ok(Command::List));
        assert_eq!(parse_command("help"), Ok(Command::Help));
        assert_eq!(parse_command(""), Err(ParseError::Empty));
        assert_eq!(
            parse_command("list now"),
            Err(ParseError::Unexpected("now".into()))
        );
        assert_eq!(
            parse_command("scratch"),
            Err(ParseError::Unknown("scratch".into()))
        );
    }

    #[test]
    fn test_audio_command_mapping() {
        let id = TrackId::new(4);
        assert_eq!(
            Command::Play(Target::All).to_audio_command(),
            Some(AudioCommand::PlayAll)
        );
        assert_eq!(
            Command::Gain(id, 2.0).to_audio_command(),
            Some(AudioCommand::SetGain(id, 2.0))
        );
        assert_eq!(Command::Export(None).to_audio_command(), None);
        assert_eq!(Command::List.to_audio_command(), None);
    }
}
