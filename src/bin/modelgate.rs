use anyhow::Result;

fn main() -> Result<()> {
    modelgate::cli::run()
}
