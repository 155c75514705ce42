//! # heliosdb: interactive shell
//!
//! A REPL-style driver for the HeliosDB storage engine. Reads commands from
//! stdin, executes them against the engine, and prints results to stdout.
//! Works interactively and scripted (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value   Insert or update a key
//! GET key         Look up a key (prints the value or "(nil)")
//! DEL key         Delete a key (writes a tombstone)
//! FLUSH           Force-flush the memtable to an SSTable
//! COMPACT         Request a background compaction
//! STATS           Print engine counters
//! EXIT / QUIT     Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! ```text
//! HELIOS_DATA_DIR   Data directory (default: "data")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ heliosdb
//! HeliosDB started (dir=data, sstables=0)
//! > SET name Alice
//! OK
//! > GET name
//! Alice
//! > EXIT
//! bye
//! ```

use anyhow::Result;
use engine::HeliosDb;
use std::io::{self, BufRead, Write};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let data_dir = env_or("HELIOS_DATA_DIR", "data");
    let mut db = HeliosDb::open(&data_dir)?;

    println!(
        "HeliosDB started (dir={}, sstables={})",
        data_dir,
        db.sstable_count()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    print!("> ");
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();

        match parts.next().map(|c| c.to_ascii_uppercase()).as_deref() {
            Some("SET") => match (parts.next(), parts.next()) {
                (Some(key), Some(value)) => {
                    match db.put(key.as_bytes().to_vec(), value.as_bytes().to_vec()) {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR {}", e),
                    }
                }
                _ => println!("usage: SET key value"),
            },
            Some("GET") => match parts.next() {
                Some(key) => match db.get(key.as_bytes()) {
                    Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                    None => println!("(nil)"),
                },
                None => println!("usage: GET key"),
            },
            Some("DEL") => match parts.next() {
                Some(key) => match db.del(key.as_bytes().to_vec()) {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR {}", e),
                },
                None => println!("usage: DEL key"),
            },
            Some("FLUSH") => match db.flush() {
                Ok(()) => println!("OK"),
                Err(e) => println!("ERR {}", e),
            },
            Some("COMPACT") => {
                db.compact();
                println!("OK");
            }
            Some("STATS") => println!("{:?}", db),
            Some("EXIT") | Some("QUIT") => break,
            Some(other) => println!("unknown command: {}", other),
            None => {}
        }

        print!("> ");
        stdout.flush()?;
    }

    db.close();
    println!("bye");
    Ok(())
}
