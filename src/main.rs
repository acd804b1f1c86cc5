use std::env;
use std::fs;
use std::process;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_target(false)
    .init();

  let args: Vec<String> = env::args().collect();
  if args.len() != 2 {
    let program = args.first().map(String::as_str).unwrap_or("armlet");
    eprintln!("usage: {program} <source-file>");
    process::exit(1);
  }

  let source = fs::read_to_string(&args[1]).with_context(|| format!("reading {}", args[1]))?;
  match armlet::generate_assembly(&source) {
    Ok(asm) => print!("{asm}"),
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  }
  Ok(())
}
