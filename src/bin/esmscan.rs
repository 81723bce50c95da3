//! Thin CLI for manually exercising the library (spec.md §1: the real front-end is an
//! external collaborator, this binary just runs one scan and prints the counts).

use std::{fs, process::ExitCode};

use clap::{Parser, Subcommand};
use esm_scan::{
    config::ScanConfig,
    recover_runtime_hash_table, scan_dump, scan_esm_buffer,
    source::{CapturedRegion, InMemorySource, ModuleInfo, VirtualAddressResolver},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a file as a structured ESM (TES4 header + GRUP/record tree)
    ScanEsm {
        #[arg(value_name = "FILE")]
        file: String,
    },
    /// Scan a file as an unstructured byte span (process-memory dump)
    ScanDump {
        #[arg(value_name = "FILE")]
        file: String,
    },
    /// Walk a captured module image's runtime hash table
    HashTable {
        #[arg(value_name = "FILE")]
        file: String,
    },
}

/// Treats the whole captured file as a single identity-mapped region: virtual
/// address N is file offset N. Good enough for manually exercising the walker
/// against a flat module dump; a real host implements this against its own
/// minidump-style region list (spec §6).
struct FlatFileResolver {
    region: CapturedRegion,
    image_name: String,
}

impl FlatFileResolver {
    fn new(file: &str, len: u64) -> Self {
        FlatFileResolver {
            region: CapturedRegion {
                virtual_address: 0,
                size: len,
                file_offset: 0,
                writable: true,
            },
            image_name: file.to_string(),
        }
    }
}

impl VirtualAddressResolver for FlatFileResolver {
    fn regions(&self) -> &[CapturedRegion] {
        std::slice::from_ref(&self.region)
    }

    fn locate_module(&self) -> Option<ModuleInfo> {
        Some(ModuleInfo {
            base_va: self.region.virtual_address,
            size: self.region.size,
            image_name: self.image_name.clone(),
        })
    }
}

fn print_summary(result: &esm_scan::result::AggregateResult) {
    let counts = result.counts();
    println!("main records:        {}", counts.main_record_total);
    println!("reconstructed:        {}", counts.reconstructed_entity_total);
    println!("editor ids:           {}", result.raw().editor_ids.len());
    println!("form id refs:         {}", result.raw().form_id_refs.len());
    println!("diagnostics:          {}", result.diagnostics().entries().len());
    let mut by_kind: Vec<_> = counts.by_kind.iter().collect();
    by_kind.sort_by_key(|(_, &n)| std::cmp::Reverse(n));
    for (kind, n) in by_kind {
        println!("  {kind:?}: {n}");
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let config = ScanConfig::default();

    let outcome = match &cli.command {
        Commands::ScanEsm { file } => fs::read(file)
            .map_err(|e| e.to_string())
            .and_then(|buf| scan_esm_buffer(&buf, &config).map_err(|e| e.to_string()))
            .map(|result| print_summary(&result)),
        Commands::ScanDump { file } => fs::read(file)
            .map_err(|e| e.to_string())
            .and_then(|buf| {
                let source = InMemorySource::new(&buf);
                scan_dump(&source, &config).map_err(|e| e.to_string())
            })
            .map(|result| print_summary(&result)),
        Commands::HashTable { file } => fs::read(file)
            .map_err(|e| e.to_string())
            .and_then(|buf| {
                let source = InMemorySource::new(&buf);
                let resolver = FlatFileResolver::new(file, buf.len() as u64);
                recover_runtime_hash_table(&source, &resolver, &config).map_err(|e| e.to_string())
            })
            .map(|entries| {
                println!("recovered editor ids: {}", entries.len());
                for entry in entries.iter().take(20) {
                    println!("  {} -> {:?}", entry.editor_id, entry.form_id);
                }
            }),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("esmscan: {message}");
            ExitCode::FAILURE
        }
    }
}
