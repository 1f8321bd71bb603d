//! `vcassist tools`: print the catalog the model sees.

use crate::runtime::{Options, Runtime};

pub async fn run(options: Options, json: bool) -> anyhow::Result<()> {
    let runtime = Runtime::build(options).await?;
    let descriptors = runtime.tools.list_tools();

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    for descriptor in descriptors {
        println!("{}", descriptor.name);
        println!("    {}", descriptor.description);
        let schema = serde_json::to_string(&descriptor.parameters)?;
        println!("    parameters: {schema}");
        println!();
    }
    Ok(())
}
