use apng::ApngDecoder;
use clap::Parser;
use glob::glob;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(name = "apng")]
struct Cli {
    #[arg(required = true)]
    path: String,

    #[arg(long, help = "Print the parsed stream info as JSON")]
    info: bool,

    #[arg(long, help = "Decode without reporting anything")]
    void: bool,
}

fn get_files(path: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let absolute_pattern = if Path::new(path).is_relative() {
        base_dir.join(path).to_string_lossy().into_owned()
    } else {
        path.to_string()
    };

    for entry in glob(&absolute_pattern).expect("Failed to read glob pattern") {
        match entry {
            Ok(path) => {
                if !path.is_file() {
                    continue;
                }

                files.push(path);
            }
            Err(e) => println!("{:?}", e),
        }
    }

    files
}

fn process_file(file: &Path, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    println!("File: {}", file.display());

    let mut decoder = ApngDecoder::open(file)?;
    let sequence = decoder.decode()?;

    if cli.void {
        return Ok(());
    }

    if cli.info {
        println!("{}", serde_json::to_string_pretty(&decoder.info())?);
        return Ok(());
    }

    let first = sequence.frame(0);

    println!(
        "  {}x{}, {} frame(s), loop count {}",
        first.map(|f| f.width()).unwrap_or(0),
        first.map(|f| f.height()).unwrap_or(0),
        sequence.len(),
        sequence.loop_count(),
    );
    println!("  delays (ms): {:?}", sequence.delays_ms());

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let files = get_files(&cli.path);

    if files.is_empty() {
        eprintln!("No files found matching pattern: {}", cli.path);
        return Ok(());
    }

    for file in files {
        if let Err(err) = process_file(&file, &cli) {
            eprintln!("Error processing file: {:?}", err);
            continue;
        }
    }

    Ok(())
}
