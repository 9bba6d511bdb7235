//! The `mkimage` applet creates a blank disk image carrying an MBR whose
//! first partition spans the rest of the device.

use crate::error;
use std::env::ArgsOs;
use std::path::PathBuf;
use std::process::exit;
use t2fs::{Disk, Mbr};

/// The default image size, in sectors.
const DEFAULT_SECTORS: u64 = 16384;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The size of the image, in sectors.
    sectors: Option<u64>,
    /// The path of the image file to create.
    path: Option<PathBuf>,
}

fn parse_args(args: ArgsOs) -> Args {
    let mut res: Args = Default::default();
    let mut iter = args;
    while let Some(arg) = iter.next() {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            Some("-s" | "--sectors") => {
                res.sectors = iter
                    .next()
                    .and_then(|s| s.to_str().and_then(|s| s.parse().ok()));
                if res.sectors.is_none() {
                    error("mkimage", "`--sectors` expects a number");
                }
            }
            _ => res.path = Some(PathBuf::from(arg)),
        }
    }
    res
}

fn print_help() {
    println!();
    println!("Usage:");
    println!(" mkimage [options] <image>");
    println!();
    println!("Creates a blank disk image with a single partition.");
    println!();
    println!("Options:");
    println!(" -h, --help\t\tPrints help.");
    println!(" -s, --sectors <n>\tSize of the image in sectors (default {DEFAULT_SECTORS}).");
}

pub fn main(args: ArgsOs) {
    let args = parse_args(args);
    if args.help {
        print_help();
        exit(0);
    }
    let path = args.path.unwrap_or_else(|| {
        error("mkimage", "specify path to the image to create");
    });
    let sectors = args.sectors.unwrap_or(DEFAULT_SECTORS);
    let mut disk = Disk::create(&path, sectors).unwrap_or_else(|e| {
        error("mkimage", format_args!("{}: {e}", path.display()));
    });
    let mbr = Mbr::single_partition(sectors, "t2fs partition")
        .and_then(|mbr| mbr.write(&mut disk).map(|_| mbr))
        .unwrap_or_else(|e| {
            error("mkimage", format_args!("{}: {e}", path.display()));
        });
    let part = mbr.partitions[0];
    println!(
        "{}: {sectors} sector(s), partition 0 spans sectors {}-{}",
        path.display(),
        part.first_sector,
        part.last_sector
    );
}
