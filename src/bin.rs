//! A small CLI demo driver for the woodshed pipeline: load a MIDI score, describe it, and run a
//! synthetic practice session against it without needing a live microphone.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{filter::LevelFilter, fmt::SubscriberBuilder};
use woodshed::core::event::Hand;
use woodshed::core::mode::FollowMode;
use woodshed::error::Result;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Flag that specifies verbose logging.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Flag that suppresses all tracing output.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Loads a MIDI file and prints the compiled exercise's headline metadata.
    #[cfg(feature = "midi")]
    Inspect {
        /// The MIDI file to compile.
        source: PathBuf,

        /// Which hand's notes to include.
        #[arg(short = 'H', long, default_value = "both")]
        hands: HandArg,
    },

    /// Loads a MIDI file and plays every group back through the follower at exactly its
    /// expected time, reporting the resulting accuracy (a "perfect player" run, §8 scenario 5).
    #[cfg(feature = "midi")]
    Simulate {
        /// The MIDI file to compile.
        source: PathBuf,

        /// Which hand's notes to include.
        #[arg(short = 'H', long, default_value = "both")]
        hands: HandArg,

        /// Restart from the first group after the last one completes.
        #[arg(short, long)]
        loop_mode: bool,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum HandArg {
    Right,
    Left,
    Both,
}

impl From<HandArg> for Hand {
    fn from(value: HandArg) -> Self {
        match value {
            HandArg::Right => Hand::Right,
            HandArg::Left => Hand::Left,
            HandArg::Both => Hand::Both,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose, args.quiet);

    start(args)
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level_filter = if quiet {
        LevelFilter::OFF
    } else if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    SubscriberBuilder::default()
        .with_ansi(true)
        .with_level(!quiet)
        .with_file(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_max_level(level_filter)
        .init();
}

fn start(args: Args) -> Result<()> {
    match args.command {
        #[cfg(feature = "midi")]
        Some(Command::Inspect { source, hands }) => inspect(&source, hands.into()),
        #[cfg(feature = "midi")]
        Some(Command::Simulate { source, hands, loop_mode }) => simulate(&source, hands.into(), loop_mode),
        None => {
            println!("no command given; try `woodshed --help`");
            Ok(())
        }
    }
}

#[cfg(feature = "midi")]
fn inspect(source: &PathBuf, hands: Hand) -> Result<()> {
    use woodshed::score::loader::ScoreLoader;

    let source_id = source.display().to_string();
    let exercise = ScoreLoader::load_from_path(source, hands, source_id)?;

    println!("source:         {}", exercise.source_id);
    println!("bpm:            {:.1}", exercise.bpm);
    println!("time signature: {}/{}", exercise.time_signature.0, exercise.time_signature.1);
    println!("beats per bar:  {}", exercise.beats_per_bar);
    println!("beat unit:      {:.3}s", exercise.beat_unit);
    println!("groups:         {}", exercise.len());

    Ok(())
}

#[cfg(feature = "midi")]
fn simulate(source: &PathBuf, hands: Hand, loop_mode: bool) -> Result<()> {
    use woodshed::core::event::{NoteEvent, SourceTier};
    use woodshed::score::follower::{FollowerEvent, ScoreFollower};
    use woodshed::score::loader::ScoreLoader;

    let source_id = source.display().to_string();
    let exercise = ScoreLoader::load_from_path(source, hands, source_id)?;
    let total_groups = exercise.len();

    let follow_mode = if loop_mode { FollowMode::Loop } else { FollowMode::Standard };
    let mut follower = ScoreFollower::new(exercise.clone(), follow_mode);
    follower.start(0.0)?;

    'groups: for group in &exercise.groups {
        for &pitch in &group.midi_pitches {
            let event = NoteEvent::new(pitch, woodshed::core::pitch::midi_to_frequency_hz(pitch), 1.0, 0.8, group.expected_time_sec, SourceTier::Monophonic);
            for follower_event in follower.submit(&event)? {
                if matches!(follower_event, FollowerEvent::ExerciseComplete { .. }) && !loop_mode {
                    break 'groups;
                }
            }
        }
    }

    let progress = follower.progress();
    println!("groups completed: {}/{}", progress.groups_completed, total_groups);
    println!("on_time:          {}", progress.on_time_count);
    println!("early:            {}", progress.early_count);
    println!("late:             {}", progress.late_count);
    println!("missed:           {}", progress.missed_count);
    println!("wrong:            {}", progress.wrong_count);

    Ok(())
}
