#![recursion_limit = "1024"] // for error_chain

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
extern crate hwdae;

mod info;
mod version;

use clap::ArgMatches;
use hwdae::collada;
use hwdae::config::ExportConfig;
use hwdae::errors::Result;
use hwdae::host::SnapshotHost;
use hwdae::level;
use hwdae::logger;
use std::path::Path;
use std::process::exit;

fn main() {
    let app = clap_app!(hwdae =>
        (@setting ArgRequiredElseHelp)
        (@setting VersionlessSubcommands)
        (about: "Homeworld Remastered COLLADA tools")
        (@arg verbose: -v ... "Log more (-vv for even more)")
        (@arg version: -V --version "Print version information")
        (@subcommand level =>
            (about: "Convert a .level file to COLLADA")
            (@arg INPUT: +required "Level file")
            (@arg OUTPUT: -o --output +takes_value +required "Where to write the .dae")
            (@arg triangulate: --triangulate "Write triangles instead of polygons")
            (@arg tangents: --tangents "Write tangent and bitangent arrays")
            (@arg copy_images: --("copy-images") "Copy textures next to the .dae")
        )
        (@subcommand info =>
            (about: "Print a summary of a COLLADA file")
            (@arg INPUT: +required "COLLADA file")
        )
    );
    let matches = app.get_matches();

    logger::init(logger::level_for_verbosity(matches.occurrences_of("verbose")));

    if matches.is_present("version") {
        version::print_version_info();
        return;
    }

    let res = match matches.subcommand() {
        ("level", Some(m)) => convert_level(m),
        ("info", Some(m)) => info::main(m),
        _ => {
            println!("{}", matches.usage());
            exit(1);
        }
    };

    if let Err(e) = res {
        error!("{}", e);
        for cause in e.iter().skip(1) {
            error!("caused by: {}", cause);
        }
        exit(1);
    }
}

fn convert_level(matches: &ArgMatches) -> Result<()> {
    let input = matches.value_of_os("INPUT").map(Path::new).unwrap_or(Path::new(""));
    let output = matches.value_of_os("OUTPUT").map(Path::new).unwrap_or(Path::new(""));

    let config = ExportConfig {
        triangulate: matches.is_present("triangulate"),
        tangent_arrays: matches.is_present("tangents"),
        copy_images: matches.is_present("copy_images"),
        ..Default::default()
    };

    let scene = level::import(input)?;
    let mut host = SnapshotHost::new(&scene);
    collada::export(&scene, &mut host, &config, output)
}
