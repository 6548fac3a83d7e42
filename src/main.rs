//! servo_updater - In-field firmware updater for servo debug boards
//!
//! Brings both firmware banks of a servo up to the image shipped with the
//! host. The device is probed over its EC console, switched between the RO
//! and RW banks, and each bank is flashed with the driver that matches the
//! updater generation running on the device.

mod cli;
mod progress;

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands, DeviceArgs, UpdateArgs};
use progress::BarProgress;
use servo_updater_console::{TtyConsoleProvider, UsbConsoleProvider};
use servo_updater_core::{
    classify, find_config, find_files, read_version, select_partition, BoardConfig,
    ConsoleProvider, FmapVersionReader, ImageVersionReader, PartitionRegion, Result,
    UpdateSession, Updater,
};

fn main() {
    let cli = Cli::parse();

    // Initialize logger, -v and -vv override the default info level
    let logger = build_logger(env_logger::Env::default().default_filter_or("info"), cli.verbose);
    let max_level = logger.filter();
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }

    if let Err(e) = run(cli) {
        let kind = e.kind();
        eprintln!("Error: {}", e);
        println!("failed({})", kind);
        std::process::exit(kind.exit_code());
    }
}

fn build_logger(env: env_logger::Env<'_>, verbose: u8) -> env_logger::Logger {
    let mut builder = env_logger::Builder::from_env(env);
    match verbose {
        0 => {} // default (info)
        1 => {
            builder.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
        }
    }
    builder.build()
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        data_dir,
        console_tty,
        update,
        command,
        ..
    } = cli;
    let data_dir = data_dir.as_deref();

    let mut console: Box<dyn ConsoleProvider> = match console_tty {
        Some(path) => Box::new(TtyConsoleProvider::new(path)),
        None => Box::new(UsbConsoleProvider::default()),
    };

    match command.unwrap_or(Commands::Update(update)) {
        Commands::Update(args) => cmd_update(console.as_mut(), data_dir, args),
        Commands::Probe { device } => cmd_probe(console.as_mut(), data_dir, &device),
        Commands::Select {
            device,
            region,
            settle_ms,
        } => {
            let region: PartitionRegion = region.parse()?;
            cmd_select(console.as_mut(), data_dir, &device, region, settle_ms)
        }
        Commands::ImageVersion { board, file } => {
            cmd_image_version(data_dir, &board, file.as_deref())
        }
    }
}

fn load_board(data_dir: Option<&Path>, device: &DeviceArgs) -> Result<BoardConfig> {
    let config = find_config(&device.board, data_dir)?;
    Ok(BoardConfig::from_file(config)?)
}

fn cmd_update(
    console: &mut dyn ConsoleProvider,
    data_dir: Option<&Path>,
    args: UpdateArgs,
) -> Result<()> {
    let files = find_files(&args.device.board, args.file.as_deref(), data_dir)?;
    let board = BoardConfig::from_file(&files.config)?;
    log::info!("Board: {}, image: {}", board.board, files.image.display());

    let mut flashers = servo_updater_flash::flashers(
        &board,
        &args.updater_tool,
        Box::new(BarProgress::default()),
    );

    let mut session = UpdateSession::new(board, files.image, args.device.serialno);
    session.force = args.force;
    session.reboot_after_noop = args.reboot;
    session.settle = Duration::from_millis(args.settle_ms);

    let outcome = Updater::new(console, &mut flashers, &FmapVersionReader).run(&session)?;
    println!("{}", outcome);
    Ok(())
}

fn cmd_probe(
    console: &mut dyn ConsoleProvider,
    data_dir: Option<&Path>,
    device: &DeviceArgs,
) -> Result<()> {
    let board = load_board(data_dir, device)?;
    let identity = board.identity(device.serialno.clone());

    let version = read_version(console, &identity)?;
    let generation = classify(&version)?;
    println!("{} ({})", version, generation);
    Ok(())
}

fn cmd_select(
    console: &mut dyn ConsoleProvider,
    data_dir: Option<&Path>,
    device: &DeviceArgs,
    region: PartitionRegion,
    settle_ms: u64,
) -> Result<()> {
    let board = load_board(data_dir, device)?;
    let identity = board.identity(device.serialno.clone());

    select_partition(console, &identity, region, Duration::from_millis(settle_ms))?;
    println!("{}", region);
    Ok(())
}

fn cmd_image_version(data_dir: Option<&Path>, board: &str, file: Option<&Path>) -> Result<()> {
    let files = find_files(board, file, data_dir)?;
    let config = BoardConfig::from_file(&files.config)?;
    let version = FmapVersionReader.image_version(&files.image, &config.board)?;
    println!("{}", version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, LevelFilter, Log, Metadata};

    fn logger(verbose: u8) -> env_logger::Logger {
        let env = env_logger::Env::new()
            .filter_or("SERVO_UPDATER_TEST_LOG", "info")
            .write_style("SERVO_UPDATER_TEST_LOG_STYLE");
        build_logger(env, verbose)
    }

    fn enabled(logger: &env_logger::Logger, level: Level) -> bool {
        logger.enabled(&Metadata::builder().level(level).target("servo_updater_core").build())
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["servo_updater"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.update.device.board, servo_updater_core::config::DEFAULT_BOARD);
        assert_eq!(cli.update.updater_tool, servo_updater_flash::DEFAULT_TOOL);
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["servo_updater", "image-version"]).unwrap();
        match cli.command {
            Some(Commands::ImageVersion { board, file }) => {
                assert_eq!(board, servo_updater_core::config::DEFAULT_BOARD);
                assert!(file.is_none());
            }
            _ => panic!("expected image-version"),
        }
    }

    #[test]
    fn test_default_verbosity() {
        let logger = logger(0);
        assert_eq!(logger.filter(), LevelFilter::Info);
        assert!(enabled(&logger, Level::Info));
        assert!(!enabled(&logger, Level::Debug));
    }

    #[test]
    fn test_verbose_enables_debug_and_trace() {
        let debug = logger(1);
        assert_eq!(debug.filter(), LevelFilter::Debug);
        assert!(enabled(&debug, Level::Debug));
        assert!(!enabled(&debug, Level::Trace));

        let trace = logger(2);
        assert_eq!(trace.filter(), LevelFilter::Trace);
        assert!(enabled(&trace, Level::Trace));
    }
}
