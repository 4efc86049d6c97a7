//! In-place rewrite of a processed G-code file
//!
//! The first pass replaces placeholder lines with computed values, writes
//! `M73` progress lines before motion lines and records the filament and
//! extruder usage ranges. The second pass injects the remaining filament
//! change counts and the pre-cooling / pre-heating commands scheduled in
//! between. Both passes stream through temporary files next to the input;
//! the original is only replaced by the final rename.

pub mod inserted;
pub mod offsets;
pub mod pass_one;
pub mod pre_cooling;
pub mod stream;
pub mod usage;

use crate::result::{MoveVertex, PrintStatistics};
use gcodeplan_core::{PostProcessError, TimeMode};
use gcodeplan_planner::TimeMachine;
use gcodeplan_settings::Config;
use inserted::InsertedLines;
use offsets::OffsetMap;
use pass_one::{PassOne, PassOneReport};
use pre_cooling::PreCoolingScheduler;
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What the rewriter needs from a finished processing run
#[derive(Debug, Clone, Copy)]
pub struct PostProcessContext<'a> {
    pub config: &'a Config,
    pub machines: &'a [TimeMachine],
    pub statistics: &'a PrintStatistics,
}

impl PostProcessContext<'_> {
    /// Mode whose times drive the pre-cooling schedule
    fn schedule_mode(&self) -> TimeMode {
        self.machines
            .iter()
            .find(|m| m.is_enabled())
            .map_or(TimeMode::Normal, |m| m.mode())
    }
}

fn temp_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove temporary file {}: {}", path.display(), err);
        }
    }
}

fn open(path: &Path) -> Result<File, PostProcessError> {
    File::open(path).map_err(|source| PostProcessError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn create(path: &Path) -> Result<File, PostProcessError> {
    File::create(path).map_err(|source| PostProcessError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn first_pass(
    input: &Path,
    output: &Path,
    ctx: &PostProcessContext<'_>,
) -> Result<PassOneReport, PostProcessError> {
    let reader = open(input)?;
    let writer = create(output)?;
    let mut pass = PassOne::new(ctx);
    let lines = stream::rewrite_lines(reader, writer, input, output, |id, line, out| {
        pass.handle_line(id, line, out)
    })?;
    debug!("First pass read {} lines", lines);
    Ok(pass.finish())
}

fn second_pass(
    input: &Path,
    output: &Path,
    inserted: &InsertedLines,
) -> Result<(), PostProcessError> {
    let reader = open(input)?;
    let writer = create(output)?;
    stream::rewrite_lines(reader, writer, input, output, |id, line, out| {
        out.extend_from_slice(line);
        out.push(b'\n');
        for extra in inserted.after(id) {
            out.extend_from_slice(extra.text.as_bytes());
        }
    })?;
    Ok(())
}

/// Rewrite `path` in place and update the line ids of `moves`
///
/// On error the temporary files are removed and both `path` and `moves` are
/// left as they were.
pub fn run(
    path: &Path,
    ctx: &PostProcessContext<'_>,
    moves: &mut [MoveVertex],
) -> Result<(), PostProcessError> {
    info!("Post-processing {}", path.display());
    let first = temp_path(path, ".postprocess");
    let second = temp_path(path, ".postprocessed");

    let mut report = match first_pass(path, &first, ctx) {
        Ok(report) => report,
        Err(err) => {
            discard(&first);
            return Err(err);
        }
    };

    let offsets = OffsetMap::new(&report.offsets);
    report.shift(&offsets);

    let mut inserted = InsertedLines::new();
    inserted.schedule_remaining_filament_changes(&report.filament_blocks);

    let filament_map = ctx.config.filament_map();
    report.close_usage_blocks(&filament_map);

    if ctx.config.estimator.enable_pre_heating {
        let free_blocks = usage::build_free_blocks(
            &report.filament_blocks,
            &report.extruder_blocks,
            &filament_map,
            report.bounds,
        );
        let shifted: Vec<MoveVertex> = moves
            .iter()
            .map(|vertex| MoveVertex {
                gcode_id: offsets.shift(vertex.gcode_id),
                ..vertex.clone()
            })
            .collect();
        PreCoolingScheduler::new(
            &shifted,
            ctx.config,
            ctx.schedule_mode(),
            &report.skippable_blocks,
        )
        .schedule(&free_blocks, &mut inserted);
    }

    if let Err(err) = second_pass(&first, &second, &inserted) {
        discard(&first);
        discard(&second);
        return Err(err);
    }

    if let Err(source) = fs::remove_file(&first) {
        discard(&second);
        return Err(PostProcessError::RemoveTemp {
            path: first,
            source,
        });
    }
    if let Err(source) = fs::rename(&second, path) {
        discard(&second);
        return Err(PostProcessError::Rename {
            from: second,
            to: path.to_path_buf(),
            source,
        });
    }

    let inserted_offsets = inserted.offsets();
    for vertex in moves.iter_mut() {
        let id = offsets.shift(vertex.gcode_id);
        vertex.gcode_id = id + inserted_offsets.offset_before(id);
    }

    info!(
        "Post-processing done: {} lines added in the first pass, {} in the second",
        offsets.total(),
        inserted.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path() {
        assert_eq!(
            temp_path(Path::new("/tmp/print.gcode"), ".postprocess"),
            PathBuf::from("/tmp/print.gcode.postprocess")
        );
    }

    #[test]
    fn test_missing_input_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.gcode");
        let config = Config::default();
        let statistics = PrintStatistics::default();
        let ctx = PostProcessContext {
            config: &config,
            machines: &[],
            statistics: &statistics,
        };
        let err = run(&path, &ctx, &mut []).unwrap_err();
        assert!(matches!(err, PostProcessError::Open { .. }));
        assert!(!temp_path(&path, ".postprocess").exists());
    }
}
