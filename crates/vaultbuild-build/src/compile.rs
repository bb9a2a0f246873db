//! Engine invocation for one build.

use std::sync::Arc;
use std::time::Duration;
use vaultbuild_core::{Error, Result, SourceMapMode};
use vaultbuild_engine::{
    BundlingEngine, EngineBuildOptions, EngineBuildOutput, OutputFile, ResolverPlugin,
};

/// Bundle text taken from the engine's output files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledBundle {
    /// Bundle source
    pub code: String,
    /// External source map, when one was requested and produced
    pub source_map: Option<String>,
}

/// Runs the engine under `timeout`.
///
/// Reported errors are left in the returned output; only a failed call or
/// an expired timeout is an `Err`.
///
/// # Errors
///
/// Returns [`Error::BuildProcess`] if the engine call fails or does not
/// finish within `timeout`. Cancellation raised by the resolver is passed
/// through unchanged.
pub async fn run_engine(
    engine: &Arc<dyn BundlingEngine>,
    options: EngineBuildOptions,
    plugin: Arc<dyn ResolverPlugin>,
    timeout: Duration,
) -> Result<EngineBuildOutput> {
    let entry = options.entry_point.clone();
    match tokio::time::timeout(timeout, engine.build(options, plugin)).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) if err.is_cancelled() => Err(err),
        Ok(Err(err)) => Err(Error::BuildProcess {
            message: format!("Engine build of '{entry}' failed: {err}"),
            source: Some(Box::new(err)),
        }),
        Err(_) => Err(Error::BuildProcess {
            message: format!("Engine did not finish '{entry}' within {}s", timeout.as_secs()),
            source: Some(Box::new(Error::Timeout {
                operation: "compile".to_string(),
                duration_secs: timeout.as_secs(),
            })),
        }),
    }
}

/// Picks the bundle, and the map when it is written separately.
///
/// # Errors
///
/// Returns [`Error::BuildProcess`] if no bundle was produced.
pub fn select_outputs(
    output: &EngineBuildOutput,
    options: &EngineBuildOptions,
) -> Result<CompiledBundle> {
    let is_map = |file: &&OutputFile| file.path.ends_with(".map");
    let code = output
        .output_files
        .iter()
        .find(|file| file.path == options.outfile)
        .or_else(|| output.output_files.iter().find(|file| !is_map(file)))
        .ok_or_else(|| Error::build("Engine produced no output"))?;

    let source_map = if options.sourcemap == SourceMapMode::External {
        let expected = format!("{}.map", code.path);
        output
            .output_files
            .iter()
            .find(|file| file.path == expected)
            .or_else(|| output.output_files.iter().find(is_map))
            .map(|file| file.contents.clone())
    } else {
        None
    };

    Ok(CompiledBundle {
        code: code.contents.clone(),
        source_map,
    })
}
