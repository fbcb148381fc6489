use std::collections::BTreeMap;
use std::path::Path;

use clap::{Parser, Subcommand};
use effect_compiler::{
    chunks::{ChunkLibrary, NoChunkProvider},
    pass::{compile_pass, CompileOptions, PassSource, ShaderSource},
    validate::NullBackend,
};
use log::error;
use rayon::prelude::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile each .vert and .frag pair or .comp file in a folder to JSON.
    /// Files with the .chunk extension can be included by any shader.
    Compile {
        /// The folder containing shaders and chunks.
        input_folder: String,
        /// The output folder for the compiled JSON files.
        output_folder: String,
        /// The entry function for vertex shaders.
        #[arg(long, default_value = "main")]
        vert_entry: String,
        /// The entry function for fragment shaders.
        #[arg(long, default_value = "main")]
        frag_entry: String,
        /// The entry function for compute shaders.
        #[arg(long, default_value = "main")]
        compute_entry: String,
        /// Don't parse the generated GLSL ES 1.00 code.
        #[arg(long)]
        skip_ast_check: bool,
        /// Report errors without stopping compilation.
        #[arg(long)]
        no_throw: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Ignore most logs to avoid flooding the console.
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .init()
        .unwrap();

    let start = std::time::Instant::now();
    match cli.command {
        Commands::Compile {
            input_folder,
            output_folder,
            vert_entry,
            frag_entry,
            compute_entry,
            skip_ast_check,
            no_throw,
        } => {
            let options = CompileOptions {
                throw_on_error: !no_throw,
                skip_ast_check,
                ..Default::default()
            };
            let entries = [
                vert_entry.as_str(),
                frag_entry.as_str(),
                compute_entry.as_str(),
            ];
            compile_folder(&input_folder, &output_folder, entries, &options)
        }
    }

    println!("Finished in {:?}", start.elapsed());
}

// Names use forward slashes without the extension like "common/lighting".
fn relative_name(root: &str, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .with_extension("")
        .to_string_lossy()
        .replace('\\', "/")
}

fn load_chunks(input: &str) -> ChunkLibrary {
    let mut library = ChunkLibrary::new();
    for entry in globwalk::GlobWalkerBuilder::from_patterns(input, &["*.chunk"])
        .build()
        .unwrap()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let source = std::fs::read_to_string(path).unwrap();
        library.add_chunk(&relative_name(input, path), &source);
    }
    library
}

fn find_programs(input: &str, entries: [&str; 3]) -> BTreeMap<String, PassSource> {
    let mut programs = BTreeMap::new();
    for entry in globwalk::GlobWalkerBuilder::from_patterns(input, &["*.vert", "*.frag", "*.comp"])
        .build()
        .unwrap()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let name = relative_name(input, path);
        let source = std::fs::read_to_string(path).unwrap();

        let pass = programs.entry(name.clone()).or_insert_with(|| PassSource {
            name: name.clone(),
            ..Default::default()
        });
        let shader = |extension: &str, entry: &str| {
            ShaderSource::new(&format!("{name}.{extension}"), &source).with_entry(entry)
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some("vert") => pass.vert = Some(shader("vert", entries[0])),
            Some("frag") => pass.frag = Some(shader("frag", entries[1])),
            Some("comp") => pass.compute = Some(shader("comp", entries[2])),
            _ => (),
        }
    }
    programs
}

fn compile_folder(input: &str, output: &str, entries: [&str; 3], options: &CompileOptions) {
    let library = load_chunks(input);
    let programs = find_programs(input, entries);
    println!(
        "Compiling {} programs with {} chunks",
        programs.len(),
        library.len()
    );

    // Each program has its own diagnostics and backend.
    programs.par_iter().for_each(|(name, pass)| {
        let options = CompileOptions {
            effect_name: name.clone(),
            ..options.clone()
        };
        match compile_pass(&library, &mut NoChunkProvider, &mut NullBackend, &options, pass) {
            Ok(compiled) => {
                let path = Path::new(output).join(format!("{name}.json"));
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                let json = serde_json::to_string_pretty(&compiled).unwrap();
                std::fs::write(path, json).unwrap();
            }
            Err(e) => error!("Error compiling {name}: {e}"),
        }
    });
}
