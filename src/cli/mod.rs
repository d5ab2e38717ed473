use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hubstash")]
#[command(version, about = "Fetch pretrained model bundles from the Hugging Face Hub", long_about = None)]
pub struct Cli {
	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
	/// Fetch artifacts concurrently instead of one after another
	#[arg(long)]
	pub parallel: bool,

	/// Convert pytorch_model.bin to model.safetensors after fetching
	#[arg(long, env = "HUBSTASH_CONVERT_SAFETENSORS")]
	pub convert_safetensors: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Fetch one or more models into local directories
	Pull {
		/// Artifacts as IDENTIFIER[@REVISION]=DESTINATION
		/// (e.g., "sonoisa/t5-base-japanese=/tmp/cache/t5_jp")
		#[arg(required = true)]
		artifacts: Vec<String>,

		#[command(flatten)]
		fetch: FetchArgs,
	},

	/// Fetch every artifact listed in a TOML manifest
	Batch {
		/// Path to the manifest file
		manifest: PathBuf,

		#[command(flatten)]
		fetch: FetchArgs,
	},

	/// List bundles fetched by this tool
	List,

	/// Check offline that a bundle directory can be reloaded
	Verify {
		/// Bundle directory
		path: PathBuf,

		/// Also build the T5 model from the weights
		#[arg(long)]
		load_model: bool,
	},
}
