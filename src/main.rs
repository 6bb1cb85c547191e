fn main() -> anyhow::Result<()> {
    pixlise_catalog::run()?;
    Ok(())
}
