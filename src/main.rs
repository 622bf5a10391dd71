// Copyright 2025 Chisomo Makombo Sakala
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use anyhow::Result;
use clap::Parser;
use simple_apt_update::app::Action;
use simple_apt_update::app::App;
use simple_apt_update::app::read_lines;
use simple_apt_update::cli::Cli;
use simple_apt_update::cli::Commands;
use simple_apt_update::config::Config;
use simple_apt_update::config::OutputFormat;
use simple_apt_update::logging::setup_tracing;
use simple_apt_update::view::JsonView;
use simple_apt_update::view::TerminalView;
use simple_apt_update::view::View;
use std::io;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
  let _log_guard = setup_tracing()?;

  let Cli { global, command } = Cli::parse();
  let config = Config::try_from(&global)?;

  let command = command.unwrap_or(Commands::Interactive);
  let startup = match command {
    Commands::Config => {
      print!("{}", config.to_toml()?);
      return Ok(());
    }
    Commands::Interactive => config.startup.clone(),
    Commands::Update => vec![Action::Update],
    Commands::List => vec![Action::List],
    Commands::Upgrade => vec![Action::Upgrade],
  };

  let view: Box<dyn View> = match config.format {
    OutputFormat::Text => Box::new(TerminalView::stdout(config.use_color())),
    OutputFormat::Json => Box::new(JsonView::stdout()),
  };

  let input = if command == Commands::Interactive {
    read_lines(io::BufReader::new(io::stdin()))
  } else {
    let (_, closed) = mpsc::unbounded_channel();
    closed
  };

  tracing::info!(?command, apt = %config.apt_path.display(), "Starting");
  App::new(&config, view).with_startup(startup).run(input).await;

  Ok(())
}
