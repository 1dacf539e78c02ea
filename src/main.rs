mod catalog;
mod collections;
mod config;
mod database;
mod descriptor;
mod error;
mod executor;
mod filter;
mod interpreter;
mod model;
mod normalize;
mod render;
mod session;
mod supplement;
mod tokens;
mod value;

#[cfg(test)]
mod testing;

use catalog::TmdbClient;
use config::Config;
use interpreter::{Interpreter, OpenAiClient};
use log::{error, info};
use session::{Reply, Session};
use std::io::{self, BufRead, Write};

fn main() -> error::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("flixchat=info"))
        .init();

    let config = Config::from_env()?;
    let db = sled::open(&config.db_path)?;
    info!("opened store at {}", config.db_path);
    let catalog = TmdbClient::new(&config)?;
    let session = Session::new(&db, &catalog, Interpreter::new(OpenAiClient::new(&config)?))?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\nAsk your question (type 'exit' to quit): ");
        io::stdout().flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        match session.respond(&line) {
            Ok(Reply::Exit) => {
                println!("Goodbye!");
                break;
            }
            Ok(Reply::Text(text)) => {
                if !text.is_empty() {
                    println!("{}", text.trim_end());
                }
            }
            Err(err) => {
                error!("request failed: {}", err);
                println!("That request could not be completed.");
            }
        }
    }
    db.flush()?;
    Ok(())
}
