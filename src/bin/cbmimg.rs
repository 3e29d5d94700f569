use clap::{App, AppSettings, Arg, SubCommand};
use std::io::{self, Read, Write};
use std::process;

use cbmimg::disk::{BamState, BlockAddr, DiskImage, ImageType};

static EXIT_FAILURE: i32 = 1;

fn main() {
    env_logger::init();

    let app = App::new("Commodore Disk Image Inspector")
        .version("0.1.0")
        .about("Read, check, and validate CBM disk images (D40/D64/D71, D80/D82, D81, D1M/D2M/D4M).")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::with_name("diskimage").required(true))
        .arg(
            Arg::with_name("type")
                .short("t")
                .long("type")
                .takes_value(true)
                .help("Image type hint (e.g. d64, d64-40, d71, d81, d80, d82, d1m, d2m, d4m)"),
        )
        .arg(
            Arg::with_name("partition")
                .short("p")
                .long("partition")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("Change into the Nth directory entry before running the command (repeatable)"),
        )
        .subcommand(SubCommand::with_name("info").about("Show image type and geometry"))
        .subcommand(SubCommand::with_name("dir").about("Show a directory listing").arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Show timestamps and GEOS details"),
        ))
        .subcommand(SubCommand::with_name("bam").about("Show the Block Availability Map (BAM)"))
        .subcommand(
            SubCommand::with_name("checkbam").about("Check the BAM for internal consistency"),
        )
        .subcommand(
            SubCommand::with_name("validate")
                .about("Validate the image: follow all chains and cross-check the BAM"),
        )
        .subcommand(
            SubCommand::with_name("fat")
                .about("Dump the derived allocation table")
                .arg(
                    Arg::with_name("disklayout")
                        .long("disklayout")
                        .takes_value(true)
                        .help("Group the dump by track, N entries per line"),
                ),
        )
        .subcommand(
            SubCommand::with_name("read")
                .about("Hex-dump one block, addressed as track/sector or LBA")
                .arg(Arg::with_name("address").required(true)),
        )
        .subcommand(
            SubCommand::with_name("showfile")
                .about("Write a file's contents to standard output")
                .arg(
                    Arg::with_name("numerical")
                        .long("numerical")
                        .takes_value(true)
                        .required(true)
                        .help("Select the file by its position in the directory"),
                ),
        );

    let matches = app.get_matches();

    let filename = matches.value_of("diskimage").unwrap();
    let hint = match matches.value_of("type") {
        Some(name) => match parse_type(name) {
            Some(image_type) => Some(image_type),
            None => {
                eprintln!("unknown image type: {}", name);
                process::exit(EXIT_FAILURE);
            }
        },
        None => None,
    };

    let mut image = match DiskImage::open_path(filename, hint) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("cannot open {}: {}", filename, e);
            process::exit(EXIT_FAILURE);
        }
    };

    if let Some(partitions) = matches.values_of("partition") {
        for index in partitions {
            let index: usize = match index.parse() {
                Ok(index) => index,
                Err(_) => {
                    eprintln!("bad partition index: {}", index);
                    process::exit(EXIT_FAILURE);
                }
            };
            if let Err(e) = enter_partition(&mut image, index) {
                eprintln!("cannot enter partition {}: {}", index, e);
                process::exit(EXIT_FAILURE);
            }
        }
    }

    let result = match matches.subcommand() {
        ("info", Some(_)) => info(&image),
        ("dir", Some(m)) => dir(&image, m.is_present("verbose")),
        ("bam", Some(_)) => bam(&image),
        ("checkbam", Some(_)) => checkbam(&image),
        ("validate", Some(_)) => validate(&mut image),
        ("fat", Some(m)) => fat(&mut image, m.value_of("disklayout")),
        ("read", Some(m)) => read_block(&image, m.value_of("address").unwrap()),
        ("showfile", Some(m)) => showfile(&image, m.value_of("numerical").unwrap()),
        _ => unreachable!(),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(EXIT_FAILURE);
    }
}

fn parse_type(name: &str) -> Option<ImageType> {
    match name.to_lowercase().as_str() {
        "d40" => Some(ImageType::D40),
        "d64" => Some(ImageType::D64),
        "d64-40" => Some(ImageType::D64Track40),
        "d64-40-speeddos" => Some(ImageType::D64Track40Speeddos),
        "d64-40-dolphin" => Some(ImageType::D64Track40Dolphin),
        "d64-40-prologic" => Some(ImageType::D64Track40Prologic),
        "d64-42" => Some(ImageType::D64Track42),
        "d71" => Some(ImageType::D71),
        "d81" => Some(ImageType::D81),
        "d80" => Some(ImageType::D80),
        "d82" => Some(ImageType::D82),
        "d1m" => Some(ImageType::D1M),
        "d2m" => Some(ImageType::D2M),
        "d4m" => Some(ImageType::D4M),
        _ => None,
    }
}

fn enter_partition(image: &mut DiskImage, index: usize) -> Result<(), String> {
    let entry = image
        .dir_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.index == index)
        .ok_or_else(|| format!("no directory entry {}", index))?;
    image.chdir(&entry).map_err(|e| e.to_string())
}

fn info(image: &DiskImage) -> Result<(), String> {
    println!("image type:   {}", image.image_type_name());
    println!("tracks:       {}", image.max_track());
    println!("max. sectors: {}", image.max_sector());
    println!("blocks:       {}", image.max_lba());
    println!("block size:   {}", image.bytes_per_block());
    println!("error map:    {}", image.error_map().is_some());
    println!("GEOS:         {}", image.is_geos());
    if !image.is_partition_table() {
        println!("blocks free:  {}", image.blocks_free());
    }
    Ok(())
}

fn dir(image: &DiskImage, verbose: bool) -> Result<(), String> {
    if let Some(header) = image.dir_header().map_err(|e| e.to_string())? {
        println!("0     \"{}\"", header.name);
    }
    let mut entries = 0;
    for entry in image.dir_iter() {
        let entry = entry.map_err(|e| e.to_string())?;
        if verbose {
            println!("{:#}", entry);
        } else {
            println!("{}", entry);
        }
        entries += 1;
    }
    if image.is_partition_table() {
        println!("{} partitions.", entries);
    } else {
        println!("{} blocks free.", image.blocks_free());
    }
    Ok(())
}

fn bam(image: &DiskImage) -> Result<(), String> {
    for track in 1..=image.max_track() {
        let sectors = image.sectors_in_track(track);
        print!(
            "t{:3}: [{:3}/{:3}] ",
            track,
            image.bam_free_on_track(track),
            sectors
        );
        for sector in 0..sectors {
            let block = match image.addr(track, sector as u8) {
                Ok(block) => block,
                Err(_) => break,
            };
            let c = match image.bam_state(block) {
                BamState::Used => 'x',
                BamState::Free | BamState::ReallyFree => '.',
                BamState::Unknown | BamState::DoesNotExist => '?',
            };
            print!("{}", c);
        }
        println!();
    }
    println!("{} blocks free.", image.blocks_free());
    Ok(())
}

fn checkbam(image: &DiskImage) -> Result<(), String> {
    let errors = image.bam_check();
    for error in &errors {
        println!("{}", error);
    }
    if errors.is_empty() {
        println!("BAM is consistent.");
        Ok(())
    } else {
        Err(format!("{} BAM inconsistencies", errors.len()))
    }
}

fn validate(image: &mut DiskImage) -> Result<(), String> {
    let errors = image.validate();
    for error in &errors {
        println!("{}", error);
    }
    if errors.is_empty() {
        println!("Image is consistent.");
        Ok(())
    } else {
        Err(format!("{} validation errors", errors.len()))
    }
}

fn fat(image: &mut DiskImage, disklayout: Option<&str>) -> Result<(), String> {
    let disklayout = match disklayout {
        Some(value) => Some(value.parse::<usize>().map_err(|e| e.to_string())?),
        None => None,
    };
    let stdout = io::stdout();
    image
        .fat_dump(disklayout, &mut stdout.lock())
        .map_err(|e| e.to_string())
}

fn parse_address(image: &DiskImage, text: &str) -> Result<BlockAddr, String> {
    if let Some((track, sector)) = text.split_once('/') {
        let track = track.parse::<u8>().map_err(|e| e.to_string())?;
        let sector = sector.parse::<u8>().map_err(|e| e.to_string())?;
        image.addr(track, sector).map_err(|e| e.to_string())
    } else {
        let lba = text.parse::<u16>().map_err(|e| e.to_string())?;
        image.addr_from_lba(lba).map_err(|e| e.to_string())
    }
}

fn read_block(image: &DiskImage, address: &str) -> Result<(), String> {
    let block = parse_address(image, address)?;
    let data = image.block(block).map_err(|e| e.to_string())?;
    println!("block {}", block);
    hexdump(data);
    Ok(())
}

fn hexdump(buffer: &[u8]) {
    const COLUMNS: usize = 16;
    for (row, chunk) in buffer.chunks(COLUMNS).enumerate() {
        print!("{:04x}: ", row * COLUMNS);
        for b in chunk {
            print!("{:02x} ", b);
        }
        for _ in chunk.len()..COLUMNS {
            print!("   ");
        }
        for b in chunk {
            print!(
                "{}",
                match *b {
                    c @ 0x20..=0x7E => c as char,
                    _ => '.',
                }
            );
        }
        println!();
    }
}

fn showfile(image: &DiskImage, index: &str) -> Result<(), String> {
    let index: usize = index.parse().map_err(|_| "bad file index".to_string())?;
    let entry = image
        .dir_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.index == index)
        .ok_or_else(|| format!("no directory entry {}", index))?;
    let mut reader = image.open_file_entry(&entry).map_err(|e| e.to_string())?;
    let mut contents = Vec::new();
    reader
        .read_to_end(&mut contents)
        .map_err(|e| e.to_string())?;
    io::stdout()
        .write_all(&contents)
        .map_err(|e| e.to_string())?;
    Ok(())
}
