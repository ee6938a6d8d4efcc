use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facewatch_capture::{CameraRing, CameraSpec};
use serde_json::Value;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

mod render;

#[zbus::proxy(
    interface = "org.facewatch.Facewatch1",
    default_service = "org.facewatch.Facewatch1",
    default_path = "/org/facewatch/Facewatch1"
)]
trait Facewatch {
    fn enroll(&self, name: &str) -> zbus::Result<String>;
    fn list_faces(&self) -> zbus::Result<String>;
    fn remove_face(&self, id: u32, confirmed: bool) -> zbus::Result<String>;
    fn restart_capture(&self) -> zbus::Result<String>;
    fn switch_camera(&self) -> zbus::Result<String>;
    fn annotations(&self) -> zbus::Result<String>;
    fn submit(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facewatch", about = "Facewatch live face labelling CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the face currently in front of the camera
    Enroll {
        /// Name to label this face with
        #[arg(short, long)]
        name: String,
    },
    /// List enrolled faces
    List,
    /// Remove an enrolled face
    Remove {
        /// Face ID to remove
        id: u32,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Print live face labels and object counts
    Watch {
        /// Polling interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
        /// Print one snapshot and exit
        #[arg(long)]
        once: bool,
    },
    /// Show daemon status
    Status,
    /// Restart capture on the active camera
    Restart,
    /// Switch to the next configured camera
    SwitchCamera,
    /// Send the full gallery to the training server
    Submit,
    /// Grab one frame from a camera without the daemon
    Test {
        /// Image directory or snapshot URL
        camera: String,
        /// Write the captured frame to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn parse(reply: &str) -> Result<Value> {
    serde_json::from_str(reply).context("daemon returned malformed JSON")
}

/// Ask a yes/no question; anything but `y`/`yes` is a no.
fn confirm(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> std::io::Result<bool> {
    write!(output, "{prompt} [y/N] ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn proxy() -> Result<FacewatchProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("cannot connect to the session bus")?;
    FacewatchProxy::new(&conn)
        .await
        .context("facewatchd is not reachable; is it running?")
}

async fn remove(proxy: &FacewatchProxy<'_>, id: u32, yes: bool) -> Result<()> {
    let faces = parse(&proxy.list_faces().await?)?;
    if !render::contains_face(&faces, id) {
        println!("Face with ID {id} not found.");
        return Ok(());
    }

    let confirmed = yes || {
        let stdin = std::io::stdin();
        confirm(
            &format!("Are you sure you want to delete the face with ID {id}?"),
            &mut stdin.lock(),
            &mut std::io::stdout(),
        )?
    };

    tracing::debug!(id, confirmed, "sending RemoveFace");
    let reply = parse(&proxy.remove_face(id, confirmed).await?)?;
    match reply["outcome"].as_str() {
        Some("removed") => println!("Removed face {id} ({})", reply["name"].as_str().unwrap_or("")),
        Some("cancelled") => println!("Deletion cancelled."),
        Some("not_found") => println!("Face with ID {id} not found."),
        _ => println!("{reply}"),
    }
    Ok(())
}

async fn watch(proxy: &FacewatchProxy<'_>, interval: Duration, once: bool) -> Result<()> {
    let mut last_frame = None;
    loop {
        let annotations = parse(&proxy.annotations().await?)?;
        let frame = annotations["face_frame"].as_u64();
        if frame != last_frame || once {
            println!("--- frame {}", frame.map(|f| f.to_string()).unwrap_or_else(|| "-".into()));
            for line in render::render_annotations(&annotations) {
                println!("{line}");
            }
            last_frame = frame;
        }
        if once {
            return Ok(());
        }
        tokio::time::sleep(interval).await;
    }
}

async fn test_camera(camera: &str, save: Option<PathBuf>) -> Result<()> {
    let spec: CameraSpec = camera.parse().map_err(anyhow::Error::msg)?;
    println!("Testing camera {spec}...");

    let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
    let mut ring = CameraRing::from_specs(std::slice::from_ref(&spec), client);
    ring.open_active().await?;
    let frame = ring.capture().await?;
    println!("Captured frame: {}x{}", frame.width(), frame.height());

    if let Some(path) = save {
        frame
            .image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Enroll { name } => {
            if name.trim().is_empty() {
                bail!("a name is required to enroll a face");
            }
            let reply = parse(&proxy().await?.enroll(&name).await?)?;
            println!("{}", render::describe_enroll(&reply, &name));
        }
        Commands::List => {
            let faces = parse(&proxy().await?.list_faces().await?)?;
            for line in render::render_face_list(&faces) {
                println!("{line}");
            }
        }
        Commands::Remove { id, yes } => remove(&proxy().await?, id, yes).await?,
        Commands::Watch { interval_ms, once } => {
            watch(&proxy().await?, Duration::from_millis(interval_ms.max(50)), once).await?
        }
        Commands::Status => {
            let status = parse(&proxy().await?.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Restart => {
            let status = parse(&proxy().await?.restart_capture().await?)?;
            println!("Capture: {}", status["state"].as_str().unwrap_or("unknown"));
        }
        Commands::SwitchCamera => {
            let status = parse(&proxy().await?.switch_camera().await?)?;
            println!(
                "Capture: {} ({})",
                status["state"].as_str().unwrap_or("unknown"),
                status["camera"].as_str().unwrap_or("-")
            );
        }
        Commands::Submit => {
            let receipt = parse(&proxy().await?.submit().await?)?;
            println!("Submitted {} faces", receipt["submitted"]);
        }
        Commands::Test { camera, save } => test_camera(&camera, save).await?,
    }

    Ok(())
}
