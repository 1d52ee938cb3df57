// src/export/manual.rs
// Instructions for building locally when the server has no pandoc

use super::command::{BIBLIOGRAPHY_FILE, DOCUMENT_FILE, PandocPlan, STYLE_FILE, shell_quote};
use super::format::{OutputFormat, PdfEngine};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualCommand {
    pub format: OutputFormat,
    pub argv: Vec<String>,
    pub one_line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualBuildKit {
    pub steps: Vec<String>,
    pub commands: Vec<ManualCommand>,
    pub notes: Vec<String>,
}

pub fn manual_build_kit(
    formats: &[OutputFormat],
    basename: &str,
    plan: &PandocPlan,
    pdf_engine: Option<PdfEngine>,
) -> ManualBuildKit {
    let mut steps = vec![format!("Save the Markdown to {} (UTF-8).", DOCUMENT_FILE)];
    if plan.bibliography {
        steps.push(format!("Save the CSL-JSON bibliography to {}.", BIBLIOGRAPHY_FILE));
    }
    if plan.style {
        steps.push(format!("Save the CSL style to {}.", STYLE_FILE));
    }
    steps.push("Run the command below for each format from the same directory.".to_string());

    let engine = pdf_engine.unwrap_or(PdfEngine::Wkhtmltopdf);
    let commands = formats
        .iter()
        .map(|format| {
            let output = format!("{}.{}", basename, format.extension());
            let mut argv = vec!["pandoc".to_string()];
            argv.extend(plan.args(*format, &output, Some(engine.as_str())));
            let one_line = argv.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ");
            ManualCommand {
                format: *format,
                argv,
                one_line,
            }
        })
        .collect();

    let mut notes = vec![
        "Install pandoc from https://pandoc.org/installing.html, or set PANDOC_PATH on the server."
            .to_string(),
    ];
    if formats.contains(&OutputFormat::Pdf) {
        notes.push(format!(
            "PDF needs one of {} installed; the command uses {}.",
            PdfEngine::names().join(", "),
            engine
        ));
    }
    if plan.bibliography {
        notes.push(
            "The bibliography must be a CSL-JSON array such as [{\"id\":\"k1\",\"title\":\"T\"}]."
                .to_string(),
        );
    }

    ManualBuildKit {
        steps,
        commands,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kit_per_format_commands() {
        let plan = PandocPlan {
            citeproc: true,
            bibliography: true,
            style: false,
            extra_args: vec![],
        };
        let kit = manual_build_kit(
            &[OutputFormat::Docx, OutputFormat::Pdf],
            "My Paper",
            &plan,
            None,
        );
        assert_eq!(kit.commands.len(), 2);
        assert_eq!(kit.commands[0].argv[0], "pandoc");
        assert!(kit.commands[1].argv.contains(&"--pdf-engine=wkhtmltopdf".to_string()));
        assert!(kit.commands[1].one_line.contains("'My Paper.pdf'"));
        assert_eq!(kit.steps.len(), 3);
        assert!(kit.notes.iter().any(|n| n.contains("PDF needs")));
    }

    #[test]
    fn test_kit_serializes_camel_case() {
        let kit = manual_build_kit(&[OutputFormat::Epub], "doc", &PandocPlan::default(), None);
        let json = serde_json::to_value(&kit).unwrap();
        assert_eq!(json["commands"][0]["format"], "epub");
        assert!(json["commands"][0]["oneLine"].is_string());
    }
}
