#[macro_use]
extern crate log;
extern crate env_logger;
extern crate hpgl2cut;

use std::env;
use std::fs::{self, File};
use std::io::{stdout, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use hpgl2cut::{CxfFont, Error, LabelRenderer, Options};

fn usage() {
    println!("Usage:\n\thpgl2cut input.plt [output.plt|- [tolerance [font.cxf]]]");
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 5 {
        usage();
        return;
    }

    let mut options = Options::default();
    if let Some(tolerance) = args.get(3) {
        match tolerance.parse::<f32>() {
            Ok(t) if t.is_finite() && t >= 0.0 => options.tolerance = t,
            _ => {
                eprintln!("invalid tolerance '{}'", tolerance);
                usage();
                process::exit(2);
            }
        }
    }

    if let Err(e) = run(&args, &options) {
        error!("{}", e);
        eprintln!("hpgl2cut: {}", e);
        process::exit(1);
    }
}

fn run(args: &[String], options: &Options) -> Result<(), Error> {
    let input = fs::read_to_string(&args[1])?;

    let font = match args.get(4) {
        Some(path) => Some(CxfFont::from_file(path)?),
        None => None,
    };

    let (plot, summary) = hpgl2cut::process(&input, options, font.as_ref().map(|f| f as &dyn LabelRenderer))?;
    info!("{}", summary.stitch);
    info!("{}", summary.organize);

    match args.get(2).map(String::as_str) {
        Some("-") => {
            // publish to stdout
            let out = stdout();
            let mut out = out.lock();
            plot.write_to(&mut out)?;
            out.flush()?;
        }
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            plot.write_to(&mut out)?;
            out.flush()?;
        }
        None => {
            let path = default_output(Path::new(&args[1]));
            info!("writing {}", path.display());
            let mut out = BufWriter::new(File::create(path)?);
            plot.write_to(&mut out)?;
            out.flush()?;
        }
    }

    Ok(())
}

/// `<stem>.cut.plt` in the input's directory.
fn default_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_string_lossy()).unwrap_or_else(|| "out".into());
    input.with_file_name(format!("{}.cut.plt", stem))
}
