use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "familiar", about = "Familiar companion daemon CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a recognition session for a patient
    Start {
        /// Patient whose known faces should be loaded
        patient_id: String,
    },
    /// Stop the running recognition session
    Stop,
    /// Show daemon and session status
    Status,
    /// Show the current detection state
    Detection,
    /// Enable narration
    Unmute,
    /// Mute narration
    Mute,
    /// Save the pending unknown face as a known person
    Save {
        /// The person's name
        name: String,
        /// Relationship to the patient (e.g., "Neighbor")
        #[arg(short, long, default_value = "")]
        relationship: String,
        /// Free-form notes
        #[arg(short, long, default_value = "")]
        notes: String,
    },
    /// Discard the pending unknown face
    Discard,
}

#[zbus::proxy(
    interface = "org.familiar.Companion1",
    default_service = "org.familiar.Companion1",
    default_path = "/org/familiar/Companion1"
)]
trait Companion {
    async fn start_camera(&self, patient_id: &str) -> zbus::Result<()>;
    async fn stop_camera(&self) -> zbus::Result<()>;
    async fn set_audio_enabled(&self, enabled: bool) -> zbus::Result<()>;
    async fn current_detection(&self) -> zbus::Result<String>;
    async fn confirm_enrollment(
        &self,
        name: &str,
        relationship: &str,
        notes: &str,
    ) -> zbus::Result<String>;
    async fn discard_enrollment(&self) -> zbus::Result<()>;
    async fn status(&self) -> zbus::Result<String>;
}

fn print_json(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default()),
        Err(_) => println!("{raw}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    let proxy = CompanionProxy::new(&connection)
        .await
        .context("is familiard running?")?;

    match cli.command {
        Commands::Start { patient_id } => {
            proxy.start_camera(&patient_id).await?;
            println!("camera started for patient {patient_id}");
        }
        Commands::Stop => {
            proxy.stop_camera().await?;
            println!("camera stopped");
        }
        Commands::Status => {
            print_json(&proxy.status().await?);
        }
        Commands::Detection => {
            print_json(&proxy.current_detection().await?);
        }
        Commands::Unmute => {
            proxy.set_audio_enabled(true).await?;
            println!("narration enabled");
        }
        Commands::Mute => {
            proxy.set_audio_enabled(false).await?;
            println!("narration muted");
        }
        Commands::Save {
            name,
            relationship,
            notes,
        } => {
            let stored = proxy
                .confirm_enrollment(&name, &relationship, &notes)
                .await?;
            print_json(&stored);
        }
        Commands::Discard => {
            proxy.discard_enrollment().await?;
            println!("pending face discarded");
        }
    }

    Ok(())
}
