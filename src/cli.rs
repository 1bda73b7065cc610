use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task. Its text is embedded automatically.
    Add {
        /// Task title
        title: String,

        /// Task description
        #[clap(short, long)]
        description: Option<String>,

        /// Task status (defaults to "todo")
        #[clap(short, long)]
        status: Option<String>,
    },

    /// List all tasks, newest first
    List,

    /// Update a task. Changed text is re-embedded.
    Update {
        /// Task id
        id: u64,

        /// New title
        #[clap(short, long)]
        title: Option<String>,

        /// New description
        #[clap(short, long)]
        description: Option<String>,

        /// New status
        #[clap(short, long)]
        status: Option<String>,
    },

    /// Delete a task
    Delete {
        /// Task id
        id: u64,
    },

    /// Create or refresh the stored embedding for a task from the given
    /// text. Empty or omitted text is a no-op.
    UpsertEmbedding {
        /// Task id
        id: u64,

        /// Text to embed
        #[clap(short, long)]
        text: Option<String>,
    },

    /// Find tasks whose text is semantically closest to the query
    Search {
        /// Query text
        query: String,

        /// Maximum number of results (defaults to 3)
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Bring stored embeddings in line with the task database
    Reconcile,

    /// Run the HTTP daemon
    Daemon,
}
