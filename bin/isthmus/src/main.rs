//! Isthmus binary.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    isthmus_node_commands::run().await
}
