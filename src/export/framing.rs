//! Framing that turns a sequence of records into one document

const DCAT_HEADER: &str = concat!(
    r#"{"conformsTo":"https://project-open-data.cio.gov/v1.1/schema","#,
    r#""describedBy":"https://project-open-data.cio.gov/v1.1/schema/catalog.json","#,
    r#""@context":"https://project-open-data.cio.gov/v1.1/schema/catalog.jsonld","#,
    r#""@type":"dcat:Catalog","dataset":["#
);

/// Bytes written around and between records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Framing {
    /// Written once, before the first record
    pub header: String,
    /// Written between two consecutive records
    pub separator: String,
    /// Written once, after the last record
    pub footer: String,
}

impl Framing {
    pub fn new(header: &str, separator: &str, footer: &str) -> Self {
        Self {
            header: header.to_string(),
            separator: separator.to_string(),
            footer: footer.to_string(),
        }
    }

    /// DCAT-US JSON catalog with the records as its `dataset` array
    pub fn dcat_json() -> Self {
        Self::new(DCAT_HEADER, ",", "]}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dcat_json_is_valid_document() {
        let framing = Framing::dcat_json();
        let document = format!(
            "{}{}{}{}{}",
            framing.header,
            r#"{"title":"a"}"#,
            framing.separator,
            r#"{"title":"b"}"#,
            framing.footer
        );

        let value: serde_json::Value = serde_json::from_str(&document).unwrap();
        assert_eq!(value["@type"], "dcat:Catalog");
        assert_eq!(value["dataset"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_default_is_empty() {
        let framing = Framing::default();
        assert!(framing.header.is_empty());
        assert!(framing.separator.is_empty());
        assert!(framing.footer.is_empty());
    }
}
