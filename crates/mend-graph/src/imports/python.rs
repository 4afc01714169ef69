//! Python import extraction via tree-sitter

use super::{ImportExtractor, ImportSpec, Language};
use crate::error::ExtractError;
use tree_sitter::{Node, Parser};

/// Extracts `import` and `from ... import` statements from Python source
pub struct PythonImports {
    parser: Parser,
}

impl PythonImports {
    /// Create an extractor with the Python grammar loaded
    ///
    /// # Errors
    /// Returns [`ExtractError::Grammar`] if the grammar version is incompatible.
    pub fn new() -> Result<Self, ExtractError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ExtractError::Grammar(e.to_string()))?;
        Ok(Self { parser })
    }
}

impl ImportExtractor for PythonImports {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extract(&mut self, source: &str) -> Result<Vec<ImportSpec>, ExtractError> {
        let tree = self.parser.parse(source, None).ok_or(ExtractError::NoTree)?;
        let mut imports = Vec::new();
        collect(tree.root_node(), source.as_bytes(), &mut imports);
        Ok(imports)
    }
}

fn collect(node: Node<'_>, source: &[u8], out: &mut Vec<ImportSpec>) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                if let Some(module) = dotted_name(name, source) {
                    out.push(ImportSpec::Module {
                        module,
                        names: Vec::new(),
                    });
                }
            }
        }
        "import_from_statement" => {
            if let Some(spec) = from_import(node, source) {
                out.push(spec);
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                collect(child, source, out);
            }
        }
    }
}

fn from_import(node: Node<'_>, source: &[u8]) -> Option<ImportSpec> {
    let module_node = node.child_by_field_name("module_name")?;

    let mut cursor = node.walk();
    let names: Vec<String> = node
        .children_by_field_name("name", &mut cursor)
        .filter_map(|n| dotted_name(n, source))
        .collect();

    if module_node.kind() == "relative_import" {
        let text = module_node.utf8_text(source).ok()?;
        let level = text.chars().take_while(|c| *c == '.').count();
        let rest = text[level..].trim();
        let module = (!rest.is_empty()).then(|| rest.to_string());
        return Some(ImportSpec::Relative {
            level,
            module,
            names,
        });
    }

    let module = module_node.utf8_text(source).ok()?.trim().to_string();
    Some(ImportSpec::Module { module, names })
}

/// Text of a `dotted_name`, or the `name` field of an `aliased_import`
fn dotted_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    let target = if node.kind() == "aliased_import" {
        node.child_by_field_name("name")?
    } else {
        node
    };
    let text = target.utf8_text(source).ok()?;
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    (!compact.is_empty()).then_some(compact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extract(source: &str) -> Vec<ImportSpec> {
        PythonImports::new().unwrap().extract(source).unwrap()
    }

    #[test]
    fn plain_imports() {
        let specs = extract("import os\nimport pkg.sub as s, json\n");
        assert_eq!(
            specs,
            vec![
                ImportSpec::Module {
                    module: "os".into(),
                    names: vec![]
                },
                ImportSpec::Module {
                    module: "pkg.sub".into(),
                    names: vec![]
                },
                ImportSpec::Module {
                    module: "json".into(),
                    names: vec![]
                },
            ]
        );
    }

    #[test]
    fn from_imports_keep_names() {
        let specs = extract("from pkg.core import load, save as s\n");
        assert_eq!(
            specs,
            vec![ImportSpec::Module {
                module: "pkg.core".into(),
                names: vec!["load".into(), "save".into()],
            }]
        );
    }

    #[test]
    fn relative_imports_count_dots() {
        let specs = extract("from . import sibling\nfrom ..base import Thing\n");
        assert_eq!(
            specs,
            vec![
                ImportSpec::Relative {
                    level: 1,
                    module: None,
                    names: vec!["sibling".into()],
                },
                ImportSpec::Relative {
                    level: 2,
                    module: Some("base".into()),
                    names: vec!["Thing".into()],
                },
            ]
        );
    }

    #[test]
    fn nested_imports_are_found() {
        let source = "def f():\n    import inner\n\nif True:\n    from outer import x\n";
        assert_eq!(extract(source).len(), 2);
    }

    #[test]
    fn broken_source_still_yields_tree() {
        let specs = extract("import a\ndef (:\n");
        assert!(specs.contains(&ImportSpec::Module {
            module: "a".into(),
            names: vec![]
        }));
    }
}
