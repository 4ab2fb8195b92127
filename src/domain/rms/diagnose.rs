use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::domain::reservation::reservation_parser::{ReservationMap, ReservationParser};
use crate::error::{Error, Result};

/// Origin of the `diagnose -r` text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnoseSource {
    /// Output captured in memory.
    Text(String),
    /// Output captured in a file.
    File(PathBuf),
    /// Live output of `<program> -r --host=<server>`.
    Command { program: String, server: String },
}

impl DiagnoseSource {
    pub fn command(server: impl Into<String>) -> Self {
        DiagnoseSource::Command { program: "diagnose".to_string(), server: server.into() }
    }

    pub fn command_args(server: &str) -> Vec<String> {
        vec!["-r".to_string(), format!("--host={}", server)]
    }

    /// Streams the diagnose output through `parser`, one line at a time.
    pub fn read_reservations(&self, parser: &ReservationParser<'_>) -> Result<ReservationMap> {
        match self {
            DiagnoseSource::Text(text) => parser.parse(text.as_bytes()),
            DiagnoseSource::File(path) => {
                let file = File::open(path).map_err(|e| Error::DiagnosticStreamError(format!("cannot open {}: {}", path.display(), e)))?;
                parser.parse(BufReader::new(file))
            }
            DiagnoseSource::Command { program, server } => Self::read_from_command(program, server, parser),
        }
    }

    fn read_from_command(program: &str, server: &str, parser: &ReservationParser<'_>) -> Result<ReservationMap> {
        let args = Self::command_args(server);
        log::debug!("Running {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(&args)
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| Error::DiagnosticStreamError(format!("failed to execute {}: {}", program, e)))?;

        let stdout = child.stdout.take().ok_or_else(|| Error::DiagnosticStreamError(format!("no stdout captured for {}", program)))?;

        let parsed = parser.parse(BufReader::new(stdout));
        if parsed.is_err() {
            // The child may still be writing; do not leave it blocked on a full pipe.
            let _ = child.kill();
        }

        let status = child.wait().map_err(|e| Error::DiagnosticStreamError(format!("failed to wait for {}: {}", program, e)))?;
        let reservations = parsed?;

        if !status.success() {
            return Err(Error::DiagnosticStreamError(format!("{} terminated with exit status {}", program, status)));
        }

        Ok(reservations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::{ActiveNodes, Node};
    use crate::domain::utils::emitter::RecordingEmitter;
    use crate::domain::utils::id::NodeName;
    use std::io::Write;

    const SR1: &str = "SR1  User DEF  -00:01:00  INFINITY  INFINITY  1  4  4
    Flags: STANDINGRSV
    ACL:   CLASS==batch
    CL:    RSV==SR1
    Task Resources: PROCS: 4
    Attributes (HostList='n1')
";

    fn active_nodes() -> ActiveNodes {
        ActiveNodes::from_nodes(&[Node::new(NodeName::new("n1"), vec![], 4, None)])
    }

    #[test]
    fn test_command_arguments() {
        assert_eq!(DiagnoseSource::command_args("pbs01"), vec!["-r", "--host=pbs01"]);
        assert_eq!(DiagnoseSource::command("pbs01"), DiagnoseSource::Command { program: "diagnose".to_string(), server: "pbs01".to_string() });
    }

    #[test]
    fn test_read_from_text() {
        let active = active_nodes();
        let emitter = RecordingEmitter::new();
        let parser = ReservationParser::new(&active, &emitter);

        let reservations = DiagnoseSource::Text(SR1.to_string()).read_reservations(&parser).unwrap();
        assert!(reservations.contains_key("SR1"));
    }

    #[test]
    fn test_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SR1.as_bytes()).unwrap();

        let active = active_nodes();
        let emitter = RecordingEmitter::new();
        let parser = ReservationParser::new(&active, &emitter);

        let reservations = DiagnoseSource::File(file.path().to_path_buf()).read_reservations(&parser).unwrap();
        assert_eq!(reservations["SR1"].nbprocs, 4);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let active = active_nodes();
        let emitter = RecordingEmitter::new();
        let parser = ReservationParser::new(&active, &emitter);

        let result = DiagnoseSource::File(PathBuf::from("/nonexistent/diagnose.txt")).read_reservations(&parser);
        assert!(matches!(result, Err(Error::DiagnosticStreamError(_))));
    }

    #[test]
    fn test_missing_command_is_fatal() {
        let active = active_nodes();
        let emitter = RecordingEmitter::new();
        let parser = ReservationParser::new(&active, &emitter);

        let source = DiagnoseSource::Command { program: "/nonexistent/diagnose".to_string(), server: "pbs01".to_string() };
        assert!(matches!(source.read_reservations(&parser), Err(Error::DiagnosticStreamError(_))));
    }
}
