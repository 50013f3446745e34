//! DOCX export: a zip container with the minimal WordprocessingML parts a
//! reader needs (content types, package rels, the document body).

use super::{xml_escape, ExportError};
use crate::story::Manuscript;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub fn export_docx(manuscript: &Manuscript, path: &Path) -> Result<PathBuf, ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let zip_err = |source| ExportError::Zip {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", options).map_err(zip_err)?;
    zip.write_all(CONTENT_TYPES.as_bytes()).map_err(io_err)?;

    zip.start_file("_rels/.rels", options).map_err(zip_err)?;
    zip.write_all(PACKAGE_RELS.as_bytes()).map_err(io_err)?;

    zip.start_file("word/document.xml", options).map_err(zip_err)?;
    zip.write_all(document_xml(manuscript).as_bytes())
        .map_err(io_err)?;

    zip.finish().map_err(zip_err)?;
    Ok(path.to_path_buf())
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>
"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>
"#;

fn document_xml(manuscript: &Manuscript) -> String {
    let mut body = String::new();
    body.push_str(&heading(&manuscript.title, "Title"));
    for chapter in &manuscript.chapters {
        body.push_str(&heading(&format!("Chapter {}", chapter.number), "Heading1"));
        for scene in &chapter.scenes {
            for paragraph in scene.prose.split("\n\n") {
                let trimmed = paragraph.trim();
                if !trimmed.is_empty() {
                    body.push_str(&plain_paragraph(trimmed));
                }
            }
        }
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
{body}    <w:sectPr/>
  </w:body>
</w:document>
"#
    )
}

fn heading(text: &str, style: &str) -> String {
    format!(
        "    <w:p><w:pPr><w:pStyle w:val=\"{style}\"/></w:pPr><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>\n",
        xml_escape(text)
    )
}

fn plain_paragraph(text: &str) -> String {
    format!(
        "    <w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>\n",
        xml_escape(text)
    )
}
