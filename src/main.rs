use clap::{Parser, Subcommand};
use hl7_lab_pipeline::{DestinationFormat, Outcome, Pipeline};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "hl7-lab-pipeline")]
#[command(about = "An HL7 ORU lab results pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and process sample HL7 messages (demo)
    Demo {
        /// Target EMR system format
        #[arg(short, long, default_value = "epic")]
        destination: DestinationFormat,
    },

    /// Process HL7 messages from a file
    File {
        /// Path to a file of messages separated by blank lines
        path: PathBuf,

        /// Target EMR system format
        #[arg(short, long, default_value = "epic")]
        destination: DestinationFormat,

        /// Directory for outcome and alert files
        #[arg(short, long, default_value = "./hl7_output")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up logging to both console and hl7_pipeline.log
    let file_appender = tracing_appender::rolling::never(".", "hl7_pipeline.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { destination } => {
            run_demo(destination);
        }
        Commands::File {
            path,
            destination,
            output,
        } => {
            process_file(&path, destination, &output).await?;
        }
    }

    Ok(())
}

/// Runs the demo over sample lab result messages
fn run_demo(destination: DestinationFormat) {
    // Normal CBC results
    let normal_message = r#"MSH|^~\&|LAB|HOSPITAL|EPIC|HOSPITAL|20240715120000||ORU^R01|MSG001|P|2.5|||
PID|1||12345678^^^HOSPITAL^MR||DOE^JOHN^A||19800515|M|||123 MAIN ST^^BALTIMORE^MD^21201||
OBR|1|ORD123456|LAB123456|CBC^COMPLETE BLOOD COUNT|||20240715113000|||||||
OBX|1|NM|WBC^WHITE BLOOD COUNT||8.5|10*3/uL|4.5-11.0|N|||F|||20240715115500||
OBX|2|NM|HGB^HEMOGLOBIN||14.2|g/dL|12.0-16.0|N|||F|||20240715115500||
OBX|3|NM|PLT^PLATELETS||250|10*3/uL|150-400|N|||F|||20240715115500||"#;

    // Chemistry panel with critical glucose and potassium
    let critical_message = r#"MSH|^~\&|LAB|HOSPITAL|EPIC|HOSPITAL|20240715130000||ORU^R01|MSG002|P|2.5|||
PID|1||98765432^^^HOSPITAL^MR||SMITH^JANE^B||19750320|F|||456 OAK ST^^BALTIMORE^MD^21201||
OBR|1|ORD789012|LAB789012|CHEM^CHEMISTRY PANEL|||20240715123000|||||||
OBX|1|NM|GLU^GLUCOSE||35|mg/dL|70-100|LL|||F|||20240715125500||
OBX|2|NM|K^POTASSIUM||6.8|mmol/L|3.5-5.0|HH|||F|||20240715125500||
OBX|3|NM|NA^SODIUM||135|mmol/L|136-145|N|||F|||20240715125500||"#;

    // Two orders in one message
    let multi_order_message = r#"MSH|^~\&|LAB|HOSPITAL|EPIC|HOSPITAL|20240715140000||ORU^R01|MSG003|P|2.5|||
PID|1||55555555^^^HOSPITAL^MR||JOHNSON^ROBERT^C||19901210|M|||789 ELM ST^^BALTIMORE^MD^21201||
OBR|1|ORD111111|LAB111111|CBC^COMPLETE BLOOD COUNT|||20240715133000|||||||
OBX|1|NM|WBC^WHITE BLOOD COUNT||15.2|10*3/uL|4.5-11.0|H|||F|||20240715135500||
OBX|2|NM|HGB^HEMOGLOBIN||6.5|g/dL|12.0-16.0|LL|||F|||20240715135500||
OBR|2|ORD222222|LAB222222|LYTES^ELECTROLYTES|||20240715133000|||||||
OBX|1|NM|NA^SODIUM||118|mmol/L|136-145|LL|||F|||20240715135500||
OBX|2|NM|K^POTASSIUM||2.2|mmol/L|3.5-5.0|LL|||F|||20240715135500||"#;

    let messages = [normal_message, critical_message, multi_order_message];
    let mut pipeline = Pipeline::new();

    println!("HL7 Lab Results Pipeline - Demo ({})", destination);

    for (i, message) in messages.iter().enumerate() {
        println!("\nProcessing message {}:", i + 1);
        match pipeline.process(message, destination) {
            Outcome::Success {
                message_id,
                has_critical,
                critical_count,
                alerts,
                ..
            } => {
                println!("  Message ID: {}", message_id);
                println!(
                    "  Critical values: {}",
                    if has_critical { "Yes" } else { "No" }
                );
                if has_critical {
                    println!("  Critical count: {}", critical_count);
                    for alert in &alerts {
                        println!(
                            "    {}: {} {} (Ref: {})",
                            alert.test_name, alert.value, alert.unit, alert.reference_range
                        );
                    }
                }
            }
            Outcome::Error { reason, .. } => {
                println!("  Error: {}", reason);
            }
        }
    }

    print_statistics(&pipeline);
}

/// Processes a file of HL7 messages, writing one JSON outcome file per
/// message and a separate alert file when critical values are present
async fn process_file(
    path: &Path,
    destination: DestinationFormat,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Processing file: {}", path.display());
    tokio::fs::create_dir_all(output).await?;

    let content = tokio::fs::read_to_string(path).await?;
    let normalized = content.replace("\r\n", "\n");

    let mut pipeline = Pipeline::new();

    for raw in normalized.split("\n\n").filter(|m| !m.trim().is_empty()) {
        let outcome = pipeline.process(raw, destination);
        match &outcome {
            Outcome::Success {
                message_id,
                record,
                alerts,
                ..
            } => {
                let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
                let out_file = output.join(format!("{}_{}_{}.json", destination, message_id, stamp));
                tokio::fs::write(&out_file, serde_json::to_vec_pretty(record)?).await?;
                info!("Saved result to {}", out_file.display());
                println!("✓ {}", message_id);

                if !alerts.is_empty() {
                    let alert = serde_json::json!({
                        "alert_type": "CRITICAL_LAB_VALUE",
                        "timestamp": chrono::Local::now().naive_local(),
                        "message_id": message_id,
                        "critical_values": alerts,
                    });
                    let alert_file =
                        output.join(format!("CRITICAL_ALERT_{}_{}.json", message_id, stamp));
                    tokio::fs::write(&alert_file, serde_json::to_vec_pretty(&alert)?).await?;
                    info!("Saved critical alert to {}", alert_file.display());
                }
            }
            Outcome::Error { reason, .. } => {
                println!("✗ Error: {}", reason);
            }
        }
    }

    print_statistics(&pipeline);
    Ok(())
}

fn print_statistics(pipeline: &Pipeline) {
    let stats = pipeline.statistics();
    println!("\nPipeline Statistics:");
    println!("  Processed: {}", stats.processed);
    println!("  Errors: {}", stats.errored);
    println!("  Critical values: {}", stats.critical);
    match stats.success_rate {
        Some(rate) => println!("  Success rate: {:.1}%", rate * 100.0),
        None => println!("  Success rate: N/A"),
    }
}
