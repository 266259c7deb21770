use clap::Parser;
use env_logger::Env;
use gbs2midi::translate::{TranslateConfig, Translator, DEFAULT_PPQN};
use std::ffi::OsStr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gbs2midi")]
#[command(version = "0.1.0")]
#[command(about = "Convert Game Boy sound files to MIDI", long_about = None)]
struct Args {
    /// Input GBS file
    input: PathBuf,

    /// Subsong number to play
    subsong: u32,

    /// Output MIDI file
    output: PathBuf,

    /// Seconds of the song to capture
    #[arg(short, long, default_value_t = 150)]
    seconds: u32,

    /// MIDI ticks per quarter note
    #[arg(long, default_value_t = DEFAULT_PPQN)]
    ppqn: u16,
}

fn main() -> Result<(), gbs2midi::Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let is_mid = args
        .output
        .extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case("mid"))
        .unwrap_or(false);
    if !is_mid {
        eprintln!("Valid output file extensions are .mid");
        std::process::exit(1);
    }

    let writes = gbs2midi::gbsplay::run(&args.input, args.subsong, args.seconds)?;
    log::info!("captured {} register writes", writes.len());

    let translator = Translator::with_config(TranslateConfig {
        ppqn: args.ppqn,
        ..TranslateConfig::default()
    });
    translator.translate(&writes, &args.output)?;
    log::info!("wrote {}", args.output.display());

    Ok(())
}
