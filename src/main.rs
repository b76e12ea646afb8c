use anyhow::Result;

fn main() -> Result<()> {
    cohort_lens::run()
}
