use crate::models::UploadedFile;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Preview {
    Html(String),
    Warning(String),
}

pub fn render_pdf_preview(file: Option<&UploadedFile>) -> Preview {
    let Some(file) = file else {
        return Preview::Warning("No PDF file uploaded.".to_string());
    };

    let encoded = STANDARD.encode(&file.bytes);
    Preview::Html(format!(
        "<h3>PDF Preview</h3>\n<iframe src=\"data:application/pdf;base64,{encoded}\" width=\"800\" height=\"100%\" \
type=\"application/pdf\" style=\"height:100vh; width:100%\"></iframe>"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_warns() {
        assert_eq!(
            render_pdf_preview(None),
            Preview::Warning("No PDF file uploaded.".to_string())
        );
    }

    #[test]
    fn upload_is_embedded_as_base64_iframe() {
        let file = UploadedFile::new("doc.pdf", b"%PDF".to_vec());
        let Preview::Html(html) = render_pdf_preview(Some(&file)) else {
            panic!("expected html preview");
        };
        assert!(html.starts_with("<h3>PDF Preview</h3>"));
        assert!(html.contains("data:application/pdf;base64,JVBERg=="));
    }
}
