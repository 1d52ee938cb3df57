// src/export/command.rs
// pandoc argument vectors shared by real builds and the manual kit

use super::format::OutputFormat;
use crate::error::{Result, ZoteroMcpError};

pub const DOCUMENT_FILE: &str = "doc.md";
pub const BIBLIOGRAPHY_FILE: &str = "refs.json";
pub const STYLE_FILE: &str = "style.csl";

/// Per-call inputs that shape every pandoc invocation.
#[derive(Debug, Clone, Default)]
pub struct PandocPlan {
    pub citeproc: bool,
    pub bibliography: bool,
    pub style: bool,
    pub extra_args: Vec<String>,
}

impl PandocPlan {
    /// Arguments after the program name, relative to the build directory.
    pub fn args(&self, format: OutputFormat, output: &str, pdf_engine: Option<&str>) -> Vec<String> {
        let mut args = vec![DOCUMENT_FILE.to_string(), "-o".to_string(), output.to_string()];
        if self.citeproc {
            args.push("--citeproc".to_string());
        }
        if format == OutputFormat::Pdf
            && let Some(engine) = pdf_engine
        {
            args.push(format!("--pdf-engine={}", engine));
        }
        if self.bibliography {
            args.push("--bibliography".to_string());
            args.push(BIBLIOGRAPHY_FILE.to_string());
        }
        if self.style {
            args.push("--csl".to_string());
            args.push(STYLE_FILE.to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Reject extra arguments that would redirect pandoc's output.
pub fn check_extra_args(extra: &[String]) -> Result<()> {
    let redirecting: Vec<&str> = extra
        .iter()
        .map(|a| a.trim())
        .filter(|a| {
            *a == "-o"
                || *a == "--output"
                || a.starts_with("--output=")
                || (a.starts_with("-o") && !a.starts_with("--"))
        })
        .collect();
    if redirecting.is_empty() {
        Ok(())
    } else {
        Err(ZoteroMcpError::InputShape(format!(
            "extraArgs may not set the output file ({}).",
            redirecting.join(", ")
        )))
    }
}

/// Quote an argument for a POSIX shell one-liner.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_full_plan() {
        let plan = PandocPlan {
            citeproc: true,
            bibliography: true,
            style: true,
            extra_args: vec!["--toc".into()],
        };
        assert_eq!(
            plan.args(OutputFormat::Pdf, "out.pdf", Some("/usr/bin/xelatex")),
            vec![
                "doc.md", "-o", "out.pdf", "--citeproc", "--pdf-engine=/usr/bin/xelatex",
                "--bibliography", "refs.json", "--csl", "style.csl", "--toc"
            ]
        );
    }

    #[test]
    fn test_engine_only_for_pdf() {
        let plan = PandocPlan::default();
        assert_eq!(
            plan.args(OutputFormat::Docx, "out.docx", Some("xelatex")),
            vec!["doc.md", "-o", "out.docx"]
        );
    }

    #[test]
    fn test_check_extra_args() {
        assert!(check_extra_args(&["--toc".into(), "--number-sections".into()]).is_ok());
        for bad in ["-o", "--output", "--output=x.pdf", "-ox.pdf"] {
            assert!(check_extra_args(&[bad.to_string()]).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("doc.md"), "doc.md");
        assert_eq!(shell_quote("My Paper.pdf"), "'My Paper.pdf'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
