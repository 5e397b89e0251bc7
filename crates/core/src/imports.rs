//! Import Analyzer — line-oriented, language-dispatched regex extraction of
//! import edges, plus the import-frequency graph built from them.
//!
//! Module resolution is deliberately out of scope: frequency is computed over
//! the raw imported identifier as written in source, and comments are not
//! stripped before matching (`// import foo` counts — this is documented
//! behavior, not a bug).

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImportEdge {
    pub importer_path: String,
    pub imported: String,
    pub language: String,
    pub line: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ImportGraph {
    pub edges: Vec<ImportEdge>,
    pub frequency: HashMap<String, u32>,
}

fn normalize_language(language: &str) -> &'static str {
    match language.to_ascii_lowercase().as_str() {
        "js" | "jsx" | "mjs" | "cjs" | "javascript" => "javascript",
        "ts" | "tsx" | "typescript" => "javascript",
        "py" | "python" => "python",
        "java" => "java",
        "go" | "golang" => "go",
        "rs" | "rust" => "rust",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" | "c++" => "c",
        "cs" | "csharp" | "c#" => "csharp",
        _ => "unsupported",
    }
}

struct JsPatterns {
    es6_from: Regex,
    side_effect: Regex,
    require: Regex,
    dynamic_import: Regex,
}

fn js_patterns() -> &'static JsPatterns {
    static CELL: OnceLock<JsPatterns> = OnceLock::new();
    CELL.get_or_init(|| JsPatterns {
        es6_from: Regex::new(r#"import\s+[^'";]*\bfrom\s+['"]([^'"]+)['"]"#).unwrap(),
        side_effect: Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]\s*;?\s*$"#).unwrap(),
        require: Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap(),
        dynamic_import: Regex::new(r#"import\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap(),
    })
}

struct PyPatterns {
    import: Regex,
    from_import: Regex,
}

fn py_patterns() -> &'static PyPatterns {
    static CELL: OnceLock<PyPatterns> = OnceLock::new();
    CELL.get_or_init(|| PyPatterns {
        import: Regex::new(r"^\s*import\s+([\w.]+(?:\s*,\s*[\w.]+)*)").unwrap(),
        from_import: Regex::new(r"^\s*from\s+([\w.]+)\s+import\b").unwrap(),
    })
}

fn java_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"^\s*import\s+(?:static\s+)?([\w.]+(?:\.\*)?)\s*;").unwrap())
}

fn rust_patterns() -> &'static (Regex, Regex) {
    static CELL: OnceLock<(Regex, Regex)> = OnceLock::new();
    CELL.get_or_init(|| {
        (
            Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([\w:]+)").unwrap(),
            Regex::new(r"^\s*extern\s+crate\s+(\w+)\s*;").unwrap(),
        )
    })
}

fn c_patterns() -> &'static (Regex, Regex) {
    static CELL: OnceLock<(Regex, Regex)> = OnceLock::new();
    CELL.get_or_init(|| {
        (Regex::new(r#"^\s*#\s*include\s*<([^>]+)>"#).unwrap(), Regex::new(r#"^\s*#\s*include\s*"([^"]+)""#).unwrap())
    })
}

fn csharp_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"^\s*using\s+(?:static\s+)?([\w.]+)\s*;\s*$").unwrap())
}

fn go_single_import() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r#"^\s*import\s+(?:(\w+)\s+)?"([^"]+)""#).unwrap())
}

fn go_block_line() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r#"^\s*(?:(\w+)\s+)?"([^"]+)""#).unwrap())
}

/// Extracts import edges from one file's source, dispatching on `language`.
/// Accumulates edges internally; `build_graph()` derives the frequency table.
#[derive(Clone, Debug, Default)]
pub struct ImportAnalyzer {
    edges: Vec<ImportEdge>,
}

impl ImportAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_language_supported(language: &str) -> bool {
        normalize_language(language) != "unsupported"
    }

    pub fn analyze_file(&mut self, code: &str, language: &str, importer_path: &str) -> Vec<ImportEdge> {
        let lang = normalize_language(language);
        let new_edges = match lang {
            "javascript" => analyze_js(code),
            "python" => analyze_python(code),
            "java" => analyze_java(code),
            "go" => analyze_go(code),
            "rust" => analyze_rust(code),
            "c" => analyze_c(code),
            "csharp" => analyze_csharp(code),
            _ => Vec::new(),
        };

        let edges: Vec<ImportEdge> = new_edges
            .into_iter()
            .map(|(imported, line)| ImportEdge {
                importer_path: importer_path.to_string(),
                imported,
                language: lang.to_string(),
                line,
            })
            .collect();

        self.edges.extend(edges.clone());
        edges
    }

    pub fn build_graph(&self) -> ImportGraph {
        let mut frequency: HashMap<String, u32> = HashMap::new();
        for edge in &self.edges {
            *frequency.entry(edge.imported.clone()).or_insert(0) += 1;
        }
        ImportGraph { edges: self.edges.clone(), frequency }
    }

    pub fn frequency(&self, imported: &str) -> u32 {
        self.edges.iter().filter(|e| e.imported == imported).count() as u32
    }

    pub fn top_imported(&self, n: usize) -> Vec<(String, u32)> {
        let graph = self.build_graph();
        let mut counts: Vec<(String, u32)> = graph.frequency.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts.truncate(n);
        counts
    }

    pub fn imports_of(&self, importer_path: &str) -> Vec<&ImportEdge> {
        self.edges.iter().filter(|e| e.importer_path == importer_path).collect()
    }

    pub fn importers_of(&self, imported: &str) -> Vec<&ImportEdge> {
        self.edges.iter().filter(|e| e.imported == imported).collect()
    }

    pub fn reset(&mut self) {
        self.edges.clear();
    }

    pub fn total_imports(&self) -> usize {
        self.edges.len()
    }
}

fn dedup_modules_per_line(line_no: usize, modules: Vec<String>, out: &mut Vec<(String, usize)>) {
    for module in modules {
        if !out.iter().any(|(m, l)| m == &module && *l == line_no) {
            out.push((module, line_no));
        }
    }
}

fn analyze_js(code: &str) -> Vec<(String, usize)> {
    let patterns = js_patterns();
    let mut out = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        let mut modules = Vec::new();
        if let Some(caps) = patterns.es6_from.captures(line) {
            modules.push(caps[1].to_string());
        } else if let Some(caps) = patterns.side_effect.captures(line) {
            modules.push(caps[1].to_string());
        }
        for caps in patterns.require.captures_iter(line) {
            modules.push(caps[1].to_string());
        }
        for caps in patterns.dynamic_import.captures_iter(line) {
            modules.push(caps[1].to_string());
        }
        dedup_modules_per_line(idx + 1, modules, &mut out);
    }
    out
}

fn analyze_python(code: &str) -> Vec<(String, usize)> {
    let patterns = py_patterns();
    let mut out = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        let mut modules = Vec::new();
        if let Some(caps) = patterns.from_import.captures(line) {
            modules.push(caps[1].to_string());
        } else if let Some(caps) = patterns.import.captures(line) {
            for module in caps[1].split(',') {
                modules.push(module.trim().to_string());
            }
        }
        dedup_modules_per_line(idx + 1, modules, &mut out);
    }
    out
}

fn analyze_java(code: &str) -> Vec<(String, usize)> {
    let pattern = java_pattern();
    let mut out = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        if let Some(caps) = pattern.captures(line) {
            dedup_modules_per_line(idx + 1, vec![caps[1].to_string()], &mut out);
        }
    }
    out
}

fn analyze_rust(code: &str) -> Vec<(String, usize)> {
    let (use_re, extern_re) = rust_patterns();
    let mut out = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        let mut modules = Vec::new();
        if let Some(caps) = use_re.captures(line) {
            modules.push(caps[1].to_string());
        }
        if let Some(caps) = extern_re.captures(line) {
            modules.push(caps[1].to_string());
        }
        dedup_modules_per_line(idx + 1, modules, &mut out);
    }
    out
}

fn analyze_c(code: &str) -> Vec<(String, usize)> {
    let (angle_re, quote_re) = c_patterns();
    let mut out = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        let mut modules = Vec::new();
        if let Some(caps) = angle_re.captures(line) {
            modules.push(caps[1].to_string());
        } else if let Some(caps) = quote_re.captures(line) {
            modules.push(caps[1].to_string());
        }
        dedup_modules_per_line(idx + 1, modules, &mut out);
    }
    out
}

fn analyze_csharp(code: &str) -> Vec<(String, usize)> {
    let pattern = csharp_pattern();
    let mut out = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        if let Some(caps) = pattern.captures(line) {
            dedup_modules_per_line(idx + 1, vec![caps[1].to_string()], &mut out);
        }
    }
    out
}

fn analyze_go(code: &str) -> Vec<(String, usize)> {
    let single = go_single_import();
    let block_line = go_block_line();
    let mut out = Vec::new();
    let mut in_block = false;

    for (idx, line) in code.lines().enumerate() {
        let trimmed = line.trim();
        if !in_block && trimmed.starts_with("import") && trimmed.contains('(') {
            in_block = true;
            continue;
        }
        if in_block {
            if trimmed.starts_with(')') {
                in_block = false;
                continue;
            }
            if let Some(caps) = block_line.captures(line) {
                let module = caps.get(2).unwrap().as_str().to_string();
                dedup_modules_per_line(idx + 1, vec![module], &mut out);
            }
            continue;
        }
        if let Some(caps) = single.captures(line) {
            let module = caps.get(2).unwrap().as_str().to_string();
            dedup_modules_per_line(idx + 1, vec![module], &mut out);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn javascript_recognizes_all_four_forms() {
        let code = r#"
import React from 'react';
import './styles.css';
const fs = require('fs');
const mod = import('./lazy');
"#;
        let mut analyzer = ImportAnalyzer::new();
        let edges = analyzer.analyze_file(code, "js", "app.js");
        let modules: Vec<&str> = edges.iter().map(|e| e.imported.as_str()).collect();
        assert!(modules.contains(&"react"));
        assert!(modules.contains(&"./styles.css"));
        assert!(modules.contains(&"fs"));
        assert!(modules.contains(&"./lazy"));
    }

    #[test]
    fn line_matched_by_require_and_from_counts_each_distinct_module_once() {
        let code = r#"import x from 'a'; const y = require('a');"#;
        let mut analyzer = ImportAnalyzer::new();
        let edges = analyzer.analyze_file(code, "ts", "f.ts");
        let a_count = edges.iter().filter(|e| e.imported == "a").count();
        assert_eq!(a_count, 1, "same module on one line should count once, not per pattern");
    }

    #[test]
    fn python_handles_import_and_from_import() {
        let code = "import os\nfrom collections import OrderedDict\nimport sys, json\n";
        let mut analyzer = ImportAnalyzer::new();
        let edges = analyzer.analyze_file(code, "py", "main.py");
        let modules: Vec<&str> = edges.iter().map(|e| e.imported.as_str()).collect();
        assert!(modules.contains(&"os"));
        assert!(modules.contains(&"collections"));
        assert!(modules.contains(&"sys"));
        assert!(modules.contains(&"json"));
    }

    #[test]
    fn java_recognizes_wildcard_imports() {
        let code = "import java.util.*;\nimport java.util.List;\n";
        let mut analyzer = ImportAnalyzer::new();
        let edges = analyzer.analyze_file(code, "java", "Main.java");
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().any(|e| e.imported == "java.util.*"));
    }

    #[test]
    fn go_handles_single_and_block_imports_with_alias() {
        let code = "import \"fmt\"\nimport (\n\t\"os\"\n\tio \"io\"\n)\n";
        let mut analyzer = ImportAnalyzer::new();
        let edges = analyzer.analyze_file(code, "go", "main.go");
        let modules: Vec<&str> = edges.iter().map(|e| e.imported.as_str()).collect();
        assert!(modules.contains(&"fmt"));
        assert!(modules.contains(&"os"));
        assert!(modules.contains(&"io"));
    }

    #[test]
    fn rust_handles_use_and_extern_crate() {
        let code = "use std::collections::HashMap;\nextern crate serde;\n";
        let mut analyzer = ImportAnalyzer::new();
        let edges = analyzer.analyze_file(code, "rs", "lib.rs");
        let modules: Vec<&str> = edges.iter().map(|e| e.imported.as_str()).collect();
        assert!(modules.iter().any(|m| m.starts_with("std")));
        assert!(modules.contains(&"serde"));
    }

    #[test]
    fn c_handles_angle_and_quote_includes() {
        let code = "#include <stdio.h>\n#include \"local.h\"\n";
        let mut analyzer = ImportAnalyzer::new();
        let edges = analyzer.analyze_file(code, "c", "main.c");
        let modules: Vec<&str> = edges.iter().map(|e| e.imported.as_str()).collect();
        assert!(modules.contains(&"stdio.h"));
        assert!(modules.contains(&"local.h"));
    }

    #[test]
    fn csharp_excludes_alias_form() {
        let code = "using System;\nusing Foo = System.Collections.Generic;\n";
        let mut analyzer = ImportAnalyzer::new();
        let edges = analyzer.analyze_file(code, "cs", "Program.cs");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].imported, "System");
    }

    #[test]
    fn comments_are_not_stripped_and_still_match() {
        let code = "// import 'not-really-a-module';\nimport 'not-really-a-module';\n";
        let mut analyzer = ImportAnalyzer::new();
        let edges = analyzer.analyze_file(code, "js", "f.js");
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn top_imported_and_frequency_reflect_multiple_files() {
        let mut analyzer = ImportAnalyzer::new();
        analyzer.analyze_file("import os\n", "py", "a.py");
        analyzer.analyze_file("import os\n", "py", "b.py");
        analyzer.analyze_file("import sys\n", "py", "c.py");

        assert_eq!(analyzer.frequency("os"), 2);
        assert_eq!(analyzer.total_imports(), 3);
        let top = analyzer.top_imported(1);
        assert_eq!(top[0], ("os".to_string(), 2));

        assert_eq!(analyzer.imports_of("a.py").len(), 1);
        assert_eq!(analyzer.importers_of("os").len(), 2);

        analyzer.reset();
        assert_eq!(analyzer.total_imports(), 0);
    }

    #[test]
    fn is_language_supported_matrix() {
        assert!(ImportAnalyzer::is_language_supported("rs"));
        assert!(ImportAnalyzer::is_language_supported("tsx"));
        assert!(!ImportAnalyzer::is_language_supported("cobol"));
    }
}
