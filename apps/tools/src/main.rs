use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use quick_create::StackStore;
use serde_json::{Map, Value};
use shared::{
    domain::{EntityType, SessionId},
    naming::{camelize, STACK_SLOT},
    protocol::WorkflowState,
};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/admin.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the pending quick-create frames of a session, oldest first.
    ShowStack { session: String },
    /// Drop every pending quick-create frame of a session.
    ClearStack { session: String },
    /// List sessions that have a quick-create in progress.
    ListSessions,
    CreateRecord {
        /// Entity type, either `VenueHall` or `venue_hall`.
        entity_type: String,
        /// Field values as `name=value`.
        fields: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::ShowStack { session } => {
            let state = storage.load(&SessionId::new(session)).await?;
            for (depth, frame) in state.frames().iter().enumerate() {
                println!("#{depth} {}", serde_json::to_string(frame)?);
            }
        }
        Command::ClearStack { session } => {
            let session = SessionId::new(session);
            let depth = storage.load(&session).await?.depth();
            storage.save(&session, &WorkflowState::new()).await?;
            println!("cleared {depth} frame(s) for session {session}");
        }
        Command::ListSessions => {
            for session in storage.list_sessions_with(STACK_SLOT).await? {
                println!("{session}");
            }
        }
        Command::CreateRecord {
            entity_type,
            fields,
        } => {
            let entity_type = entity_type_arg(&entity_type);
            let fields = parse_fields(&fields)?;
            let id = storage.insert_record(&entity_type, &fields).await?;
            println!("created {entity_type} id={id}");
        }
    }

    Ok(())
}

fn entity_type_arg(raw: &str) -> EntityType {
    EntityType::new(camelize(raw))
}

fn parse_fields(raw: &[String]) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    for pair in raw {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("field '{pair}' is not of the form name=value");
        };
        if name.is_empty() {
            bail!("field '{pair}' has an empty name");
        }
        fields.insert(name.to_string(), Value::String(value.to_string()));
    }
    Ok(fields)
}
