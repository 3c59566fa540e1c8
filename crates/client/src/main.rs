use std::{env, process, sync::Arc, time::Duration};

use env_logger::Env;
use log::{error, info, warn};

use pubnostr_sdk::{
  client::CommentsClient,
  comments::{registry::Observer, Comment},
  config::Settings,
  metadata::is_valid_doi,
};

const RELAY_WAIT: Duration = Duration::from_secs(10);

const USAGE: &str = "usage:
  pubnostr watch <doi>
  pubnostr post <doi> <content> [parent-id]";

enum Command {
  Watch { doi: String },
  Post {
    doi: String,
    content: String,
    parent_id: Option<String>,
  },
}

impl Command {
  fn from_args(args: &[String]) -> Option<Self> {
    match args {
      [command, doi] if command == "watch" => Some(Self::Watch { doi: doi.clone() }),
      [command, doi, content] if command == "post" => Some(Self::Post {
        doi: doi.clone(),
        content: content.clone(),
        parent_id: None,
      }),
      [command, doi, content, parent_id] if command == "post" => Some(Self::Post {
        doi: doi.clone(),
        content: content.clone(),
        parent_id: Some(parent_id.clone()),
      }),
      _ => None,
    }
  }

  fn doi(&self) -> &str {
    match self {
      Self::Watch { doi } | Self::Post { doi, .. } => doi,
    }
  }
}

fn print_thread(doi: &str, thread: &[Comment]) {
  println!("--- {doi}: {} comments", thread.len());
  for comment in thread {
    println!("[{}] {}: {}", comment.id, comment.author, comment.content);
    for reply in &comment.replies {
      println!("    [{}] {}: {}", reply.id, reply.author, reply.content);
    }
  }
}

async fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
  let settings = Settings::from_env()?;
  let client = CommentsClient::connect(&settings).await?;

  if client.wait_for_relays(RELAY_WAIT).await == 0 {
    warn!("No relay connected yet, showing stored comments only");
  }

  match command {
    Command::Watch { doi } => {
      let printed_doi = doi.clone();
      let observer: Observer = Arc::new(move |thread: &[Comment]| print_thread(&printed_doi, thread));
      let watch = client.watch_topic(&doi, observer).await?;

      info!("Watching {doi}, press ctrl-c to stop");
      tokio::signal::ctrl_c().await?;
      watch.unsubscribe().await;
    }
    Command::Post {
      doi,
      content,
      parent_id,
    } => {
      let outcome = client
        .post_comment(&doi, &content, parent_id.as_deref())
        .await?;
      println!(
        "{} accepted by {}",
        outcome.event.id,
        outcome.accepted_by().join(", ")
      );
    }
  }

  client.disconnect().await;
  Ok(())
}

#[tokio::main]
async fn main() {
  dotenv::dotenv().ok();
  env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

  let args: Vec<String> = env::args().skip(1).collect();
  let command = match Command::from_args(&args) {
    Some(command) => command,
    None => {
      eprintln!("{USAGE}");
      process::exit(2);
    }
  };

  if !is_valid_doi(command.doi()) {
    eprintln!("{} does not look like a DOI", command.doi());
    process::exit(2);
  }

  if let Err(err) = run(command).await {
    error!("{err}");
    process::exit(1);
  }
}
