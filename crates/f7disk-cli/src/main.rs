use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use f7disk::disk::Disk;
use f7disk::geometry::{self, SlotSpec};
use f7disk::units::{parse_lba, shorten};
use f7disk::{boot, header, mbr, slots};

#[derive(Debug, Parser)]
#[command(
    name = "f7disk",
    about = "Manage F7h image-slot containers inside MBR-partitioned disks"
)]
struct Cli {
    /// Log everything the command does.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show a brief of the partition table.
    Tablebrief { file: PathBuf },
    /// Show a brief of an F7h partition.
    Brief {
        file: PathBuf,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=3))]
        entry: u8,
    },
    /// Format an existing partition as an image-slot container.
    Override {
        file: PathBuf,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=3))]
        entry: u8,
        /// Number of image slots.
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=16))]
        slots: u8,
        /// Offset of slot 0, relative to the partition (sectors or units).
        #[arg(long, value_parser = parse_lba)]
        first: Option<u64>,
        /// Sectors per slot; by default as much as the partition allows.
        #[arg(long, value_parser = parse_lba)]
        size: Option<u64>,
        /// Distance between consecutive slot starts; defaults to the slot
        /// size.
        #[arg(long, value_parser = parse_lba)]
        every: Option<u64>,
        /// Compute and print the geometry without committing any change.
        #[arg(long)]
        dry_run: bool,
    },
    /// Free all slots of an F7h partition (soft reset).
    Reset {
        file: PathBuf,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=3))]
        entry: u8,
    },
    /// Free one active slot.
    Clear {
        file: PathBuf,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=3))]
        entry: u8,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=15))]
        slot: u8,
    },
    /// Write an image into a free slot.
    Load {
        file: PathBuf,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=3))]
        entry: u8,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=15))]
        slot: u8,
        image: PathBuf,
    },
    /// Install boot code from a bootloader image, preserving the
    /// partition table and magic of the target.
    Cpboot {
        file: PathBuf,
        bootloader: PathBuf,
    },
    /// Print the tool version.
    Version,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage problems exit 1; asking for help is not a problem.
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    simple_logger::SimpleLogger::new()
        .with_level(if cli.verbose {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Warn
        })
        .init()
        .ok();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Tablebrief { file } => tablebrief(&file),
        Command::Brief { file, entry } => brief(&file, entry as usize),
        Command::Override {
            file,
            entry,
            slots,
            first,
            size,
            every,
            dry_run,
        } => {
            let spec = SlotSpec {
                slots,
                first: first.unwrap_or(1),
                size,
                every,
            };
            override_entry(&file, entry as usize, &spec, dry_run)
        }
        Command::Reset { file, entry } => {
            let mut disk = Disk::open_rw(&file)?;
            let table = mbr::read_table(&mut disk)?;
            slots::reset(&mut disk, &table, entry as usize)?;
            Ok(())
        }
        Command::Clear { file, entry, slot } => {
            let mut disk = Disk::open_rw(&file)?;
            let table = mbr::read_table(&mut disk)?;
            slots::clear(&mut disk, &table, entry as usize, slot)?;
            Ok(())
        }
        Command::Load {
            file,
            entry,
            slot,
            image,
        } => {
            let mut disk = Disk::open_rw(&file)?;
            let table = mbr::read_table(&mut disk)?;
            slots::load(&mut disk, &table, entry as usize, slot, &image)?;
            Ok(())
        }
        Command::Cpboot { file, bootloader } => {
            let mut disk = Disk::open_rw(&file)?;
            boot::install(&mut disk, &bootloader)?;
            Ok(())
        }
        Command::Version => {
            println!("f7disk v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn tablebrief(file: &Path) -> anyhow::Result<()> {
    let mut disk = Disk::open(file)?;
    let table = mbr::read_table(&mut disk)?;

    println!("# Boot Type {:>10} {:>10} {:>10} Description", "Start", "Size", "End");
    for (i, part) in table.entries.iter().enumerate() {
        print!(
            "{}  {:02X}h  {:02X}h {:>10} {:>10}",
            i, part.boot, part.kind, part.start, part.size
        );
        if part.size > 0 {
            print!(" {:>10}", part.start + part.size - 1);
        } else {
            print!(" {:>10}", "N/A");
        }
        let description = mbr::type_description(part.kind);
        if !description.is_empty() {
            print!(" {description}");
        }
        println!();
    }
    Ok(())
}

fn brief(file: &Path, entry: usize) -> anyhow::Result<()> {
    let mut disk = Disk::open(file)?;
    let table = mbr::read_table(&mut disk)?;
    let meta = header::read_meta(&mut disk, &table, entry)?;

    let active = (0..meta.count).filter(|i| meta.bitmap >> i & 0x1 == 0x1).count();
    println!("Active slots = {}/{}", active, meta.count);
    println!("Bitmap = {:04X}", meta.bitmap);
    print_sectors("First", "+", meta.first);
    print_sectors("Size", "", meta.size);
    print_sectors("Every", "", meta.every);
    Ok(())
}

fn override_entry(file: &Path, entry: usize, spec: &SlotSpec, dry_run: bool) -> anyhow::Result<()> {
    let mut disk = Disk::open_rw(file)?;
    let table = mbr::read_table(&mut disk)?;
    let geo = geometry::plan(&table.entries[entry], spec)?;

    if dry_run {
        println!("Slots = {}", geo.slots);
        print_sectors("First", "+", geo.first);
        print_sectors("Size", "", geo.size);
        print_sectors("Every", "", geo.every);
        return Ok(());
    }

    geometry::format_slots(&mut disk, &table, entry, &geo)?;
    Ok(())
}

fn print_sectors(label: &str, prefix: &str, sectors: u64) {
    let (n, unit) = shorten(sectors);
    println!("{label} = {prefix}{n}{unit}");
}
