use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use gb_core::Machine;
use gumdrop::Options;

/// A headless runner for the core: loads a ROM, runs it for a fixed number of frames
/// (no interactive input device is wired up — see the crate's non-goals around host
/// windowing/audio), and dumps the final frame to a PNG.
#[derive(Debug, Options)]
struct CliOptions {
    #[options(help = "print this help text")]
    help: bool,

    #[options(free, help = "path to the ROM image to run")]
    rom: Option<PathBuf>,

    #[options(help = "number of frames to emulate before dumping the screen", default = "60")]
    frames: u32,

    #[options(help = "path to write the final frame as a PNG")]
    output: Option<PathBuf>,

    #[options(help = "increase log verbosity (-v, -vv)", count)]
    verbose: u8,
}

fn log_level(verbosity: u8) -> log::LevelFilter {
    match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn save_path(project_dirs: &directories::ProjectDirs, rom_path: &PathBuf) -> PathBuf {
    let stem = rom_path.file_stem().and_then(|s| s.to_str()).unwrap_or("rom");
    project_dirs.data_dir().join(format!("{}.sav", stem))
}

/// Flushes battery RAM to `save_path`, if the cartridge has any and a save directory
/// could be resolved. Called periodically during the run and once more on cleanup.
fn flush_battery_ram(machine: &Machine, project_dirs: Option<&directories::ProjectDirs>, rom_path: &PathBuf) {
    let dirs = match project_dirs {
        Some(dirs) => dirs,
        None => return,
    };
    let ram = match machine.battery_ram() {
        Some(ram) => ram,
        None => return,
    };
    fs::create_dir_all(dirs.data_dir()).ok();
    if let Err(e) = fs::write(save_path(dirs, rom_path), ram) {
        log::warn!("failed to write battery RAM save: {}", e);
    }
}

fn main() -> Result<()> {
    let options = CliOptions::parse_args_default_or_exit();

    simplelog::TermLogger::init(
        log_level(options.verbose),
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
    )
    .context("failed to initialise logging")?;

    let rom_path = options.rom.context("no ROM path given; pass one as a free argument")?;
    let rom = fs::read(&rom_path).with_context(|| format!("reading ROM at {}", rom_path.display()))?;

    let project_dirs = directories::ProjectDirs::from("dev", "student", "gb_cli");
    let saved_ram = project_dirs
        .as_ref()
        .map(|dirs| save_path(dirs, &rom_path))
        .and_then(|path| fs::read(path).ok());

    let mut machine = Machine::init(rom, saved_ram).context("failed to initialise machine from ROM")?;
    log::info!("loaded ROM, running for {} frames", options.frames);

    const BATTERY_FLUSH_INTERVAL_FRAMES: u32 = 18_000;

    let no_input = [0u8; 8];
    for frame in 0..options.frames {
        machine.step_frame(no_input);
        let _samples = machine.drain_audio_samples();
        log::trace!("completed frame {}", frame);

        if frame != 0 && frame % BATTERY_FLUSH_INTERVAL_FRAMES == 0 {
            flush_battery_ram(&machine, project_dirs.as_ref(), &rom_path);
        }
    }

    flush_battery_ram(&machine, project_dirs.as_ref(), &rom_path);

    if let Some(output) = options.output {
        dump_screen(&machine, &output)?;
    }

    Ok(())
}

fn dump_screen(machine: &Machine, output: &PathBuf) -> Result<()> {
    use gb_core::{SCREEN_HEIGHT, SCREEN_WIDTH};

    let shades = machine.screen_buffer();
    let mut rgb = vec![0u8; SCREEN_WIDTH * SCREEN_HEIGHT * 3];
    for (i, &shade) in shades.iter().enumerate() {
        let gray = match shade {
            0 => 255,
            1 => 170,
            2 => 85,
            _ => 0,
        };
        rgb[i * 3] = gray;
        rgb[i * 3 + 1] = gray;
        rgb[i * 3 + 2] = gray;
    }

    image::save_buffer(
        output,
        &rgb,
        SCREEN_WIDTH as u32,
        SCREEN_HEIGHT as u32,
        image::ColorType::Rgb8,
    )
    .with_context(|| format!("writing screen dump to {}", output.display()))?;

    Ok(())
}
