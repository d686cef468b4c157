use crate::cmd::{builtin_registry, PacketsArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_registry, OutputFormat};

pub fn run(_args: PacketsArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = builtin_registry()?;
    print_registry(&registry, format);
    Ok(SUCCESS)
}
