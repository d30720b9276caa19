//! Writing dependency graphs to files.

use {
    crate::DependencyGraph,
    scope_exit::guard,
    std::{
        env,
        ffi::OsStr,
        fs::{self, File},
        io::{self, Write},
        path::{Path, PathBuf},
        process::{Command, ExitStatus},
    },
    thiserror::Error,
    tracing::{debug, warn},
};

/// Extensions for which the description is rendered into an image.
///
/// The extension doubles as the Graphviz output format.
const IMAGE_FORMATS: &[&str] = &[
    "bmp", "eps", "gif", "jpeg", "jpg", "pdf", "png", "ps", "svg", "webp",
];

/// What to write to an output file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OutputFormat
{
    /// The graph description in the DOT language.
    Description,

    /// An image rendered by Graphviz in the given format.
    Image(String),
}

impl OutputFormat
{
    /// Choose the format from the extension of the output path.
    ///
    /// Image extensions are matched case-insensitively.
    /// Any other extension, or none, selects [`Self::Description`].
    pub fn for_path(path: &Path) -> Self
    {
        let extension = path.extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase);
        match extension {
            Some(ext) if IMAGE_FORMATS.contains(&ext.as_str()) =>
                Self::Image(ext),
            _ =>
                Self::Description,
        }
    }
}

/// Returned when the renderer could not produce an image.
#[derive(Debug, Error)]
pub enum RenderError
{
    /// The renderer could not be started, usually because it is missing.
    #[error("Cannot run {program}: {source}")]
    Spawn
    {
        #[allow(missing_docs)]
        program: String,

        #[allow(missing_docs)]
        source: io::Error,
    },

    /// The renderer ran but failed.
    #[error("{program} exited with {status}: {stderr}")]
    Status
    {
        #[allow(missing_docs)]
        program: String,

        #[allow(missing_docs)]
        status: ExitStatus,

        /// What the renderer wrote to standard error.
        stderr: String,
    },
}

/// Returned when a dump could not be written.
#[derive(Debug, Error)]
pub enum DumpError
{
    /// [`init_tracking`][`crate::init_tracking`] has not been called.
    #[error("Tracking is not initialized")]
    NotInitialized,

    /// The graph description could not be written.
    #[error("Cannot write {}: {source}", path.display())]
    Write
    {
        #[allow(missing_docs)]
        path: PathBuf,

        #[allow(missing_docs)]
        source: io::Error,
    },

    /// The graph description was produced but could not be rendered.
    ///
    /// The description is included so that it is not lost.
    #[error("Cannot render graph: {source}")]
    Render
    {
        /// The graph description in the DOT language.
        description: String,

        #[allow(missing_docs)]
        source: RenderError,
    },
}

/// Write a graph to `path` in the format implied by its extension.
///
/// For image formats, the description is written to a temporary file
/// which is passed to `renderer`; the temporary file is always removed.
pub fn export(graph: &DependencyGraph, path: &Path, renderer: &str)
    -> Result<(), DumpError>
{
    match OutputFormat::for_path(path) {
        OutputFormat::Description =>
            write_description(graph, path),
        OutputFormat::Image(format) =>
            export_image(graph, path, &format, renderer),
    }
}

/// Write the DOT description of a graph to `path`.
pub fn write_description(graph: &DependencyGraph, path: &Path)
    -> Result<(), DumpError>
{
    let write = || -> io::Result<()> {
        let mut file = File::create(path)?;
        write!(file, "{graph}")?;
        file.flush()
    };
    write().map_err(|source| DumpError::Write{path: path.to_owned(), source})?;
    debug!(path = %path.display(), edges = graph.edge_count(), "Wrote graph description");
    Ok(())
}

fn export_image(
    graph:    &DependencyGraph,
    path:     &Path,
    format:   &str,
    renderer: &str,
) -> Result<(), DumpError>
{
    let description = graph.to_string();

    let template = env::temp_dir().join("refdump-XXXXXX.dot");
    let (mut file, temp_path) = os_ext::mkstemps(&template, ".dot".len())
        .map_err(|source| DumpError::Write{path: template.clone(), source})?;

    // Remove the temporary file whatever happens next.
    let temp_path = guard(temp_path, |temp_path| {
        if let Err(err) = fs::remove_file(&temp_path) {
            warn!(path = %temp_path.display(), "Cannot remove temporary file: {err}");
        }
    });

    file.write_all(description.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|source| DumpError::Write{path: temp_path.to_path_buf(), source})?;
    drop(file);

    render(renderer, format, &temp_path, path)
        .map_err(|source| DumpError::Render{description, source})?;

    debug!(path = %path.display(), format, "Rendered graph");
    Ok(())
}

/// Run `renderer -T<format> <input> -o <output>`.
pub fn render(renderer: &str, format: &str, input: &Path, output: &Path)
    -> Result<(), RenderError>
{
    let result = Command::new(renderer)
        .arg(format!("-T{format}"))
        .arg(input)
        .arg("-o")
        .arg(output)
        .output();

    let output = result.map_err(|source| RenderError::Spawn{
        program: renderer.to_owned(),
        source,
    })?;

    if !output.status.success() {
        return Err(RenderError::Status{
            program: renderer.to_owned(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn graph() -> DependencyGraph
    {
        let mut graph = DependencyGraph::new();
        graph.add_edge("Info", "Map");
        graph
    }

    #[test]
    fn format_from_extension()
    {
        use OutputFormat::*;
        let for_path = |p: &str| OutputFormat::for_path(Path::new(p));
        assert_eq!(for_path("leaks.svg"), Image("svg".to_owned()));
        assert_eq!(for_path("leaks.PNG"), Image("png".to_owned()));
        assert_eq!(for_path("/tmp/a.b/leaks.pdf"), Image("pdf".to_owned()));
        assert_eq!(for_path("leaks.dot"), Description);
        assert_eq!(for_path("leaks.gv"), Description);
        assert_eq!(for_path("leaks"), Description);
        assert_eq!(for_path("svg"), Description);
    }

    #[test]
    fn description_is_written()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaks.dot");
        export(&graph(), &path, "dot").unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, graph().to_string());
        assert!(text.contains("\"Info\" -> \"Map\""));
    }

    #[test]
    fn unwritable_description_is_write_error()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("leaks.dot");
        let err = export(&graph(), &path, "dot").unwrap_err();
        assert!(matches!(&err, DumpError::Write{path: p, ..} if *p == path), "{err}");
    }

    #[test]
    fn missing_renderer_keeps_description()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaks.svg");
        let renderer = "refdump-test-renderer-that-does-not-exist";
        let err = export(&graph(), &path, renderer).unwrap_err();
        match err {
            DumpError::Render{description, source: RenderError::Spawn{program, ..}} => {
                assert_eq!(description, graph().to_string());
                assert_eq!(program, renderer);
            },
            other => panic!("Unexpected error: {other}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn failing_renderer_reports_status()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaks.png");
        let err = export(&graph(), &path, "false").unwrap_err();
        assert!(matches!(
            err,
            DumpError::Render{source: RenderError::Status{..}, ..}
        ), "{err}");
    }

    #[test]
    fn render_passes_arguments()
    {
        // Use a shell script that records its arguments as the renderer.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("renderer.sh");
        let log = dir.path().join("args");
        fs::write(&script, format!(
            "#!/bin/sh\necho \"$@\" > '{}'\ncp \"$2\" \"$4\"\n",
            log.display(),
        )).unwrap();
        make_executable(&script);

        let input = dir.path().join("in.dot");
        let output = dir.path().join("out.svg");
        fs::write(&input, "digraph {}\n").unwrap();
        render(script.to_str().unwrap(), "svg", &input, &output).unwrap();

        let args = fs::read_to_string(&log).unwrap();
        assert_eq!(args.trim(), format!(
            "-Tsvg {} -o {}", input.display(), output.display()));
        assert_eq!(fs::read_to_string(&output).unwrap(), "digraph {}\n");
    }

    #[test]
    fn image_export_removes_temporary_file()
    {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("renderer.sh");
        let log = dir.path().join("input-path");
        fs::write(&script, format!(
            "#!/bin/sh\necho \"$2\" > '{}'\ncp \"$2\" \"$4\"\n",
            log.display(),
        )).unwrap();
        make_executable(&script);

        let path = dir.path().join("leaks.svg");
        export(&graph(), &path, script.to_str().unwrap()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), graph().to_string());
        let temp = fs::read_to_string(&log).unwrap();
        let temp = Path::new(temp.trim());
        assert!(temp.extension() == Some(OsStr::new("dot")));
        assert!(!temp.exists());
    }

    fn make_executable(path: &Path)
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = fs::metadata(path).unwrap().permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(path, permissions).unwrap();
    }
}
