/*!
 * Import collection, deduplication and rendering.
 *
 * Imports are bucketed into standard library, third-party and local
 * (relative) groups. Each group renders `import x` lines first and then
 * merged `from m import a, b` lines, both sorted.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use crate::python::ast::{Alias, Expr, ExprContext, ExprKind, Module, Stmt, StmtKind};
use crate::python::visit::{self, Visitor};
use crate::validation::scope::{self, ScopeIssue};

/// Top-level standard library modules
const STANDARD_LIBRARY: &[&str] = &[
    "abc", "argparse", "array", "ast", "asyncio", "atexit", "base64", "bdb", "binascii", "bisect",
    "builtins", "bz2", "calendar", "cmath", "cmd", "code", "codecs", "collections", "colorsys",
    "concurrent", "configparser", "contextlib", "contextvars", "copy", "copyreg", "cProfile", "csv",
    "ctypes", "curses", "dataclasses", "datetime", "dbm", "decimal", "difflib", "dis", "doctest",
    "email", "encodings", "enum", "errno", "faulthandler", "fcntl", "filecmp", "fileinput",
    "fnmatch", "fractions", "ftplib", "functools", "gc", "getopt", "getpass", "gettext", "glob",
    "graphlib", "grp", "gzip", "hashlib", "heapq", "hmac", "html", "http", "imaplib", "importlib",
    "inspect", "io", "ipaddress", "itertools", "json", "keyword", "linecache", "locale", "logging",
    "lzma", "mailbox", "marshal", "math", "mimetypes", "mmap", "multiprocessing", "netrc",
    "numbers", "operator", "optparse", "os", "pathlib", "pdb", "pickle", "pkgutil", "platform",
    "plistlib", "poplib", "posix", "pprint", "profile", "pstats", "pty", "pwd", "py_compile",
    "queue", "random", "re", "readline", "reprlib", "resource", "runpy", "sched", "secrets",
    "select", "selectors", "shelve", "shlex", "shutil", "signal", "site", "smtplib", "socket",
    "socketserver", "sqlite3", "ssl", "stat", "statistics", "string", "stringprep", "struct",
    "subprocess", "symtable", "sys", "sysconfig", "syslog", "tabnanny", "tarfile", "tempfile",
    "termios", "textwrap", "threading", "time", "timeit", "tkinter", "token", "tokenize",
    "tomllib", "trace", "traceback", "tracemalloc", "tty", "turtle", "types", "typing",
    "unicodedata", "unittest", "urllib", "uuid", "venv", "warnings", "wave", "weakref",
    "webbrowser", "wsgiref", "xml", "xmlrpc", "zipapp", "zipfile", "zipimport", "zlib", "zoneinfo",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImportCategory {
    Standard,
    ThirdParty,
    Local,
}

impl ImportCategory {
    pub fn of(module: &str) -> Self {
        if module.is_empty() || module.starts_with('.') {
            return Self::Local;
        }
        let top_level = module.split('.').next().unwrap_or(module);
        if STANDARD_LIBRARY.contains(&top_level) {
            Self::Standard
        } else {
            Self::ThirdParty
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Bucket {
    /// `import x` / `import x as y` targets
    modules: BTreeSet<String>,
    /// `from m import ...` names per module
    from_names: BTreeMap<String, BTreeSet<String>>,
}

impl Bucket {
    fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.from_names.is_empty()
    }

    fn render(&self, lines: &mut Vec<String>) {
        for module in &self.modules {
            lines.push(format!("import {}", module));
        }
        for (module, names) in &self.from_names {
            if !names.is_empty() {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                lines.push(format!("from {} import {}", module, names.join(", ")));
            }
        }
    }
}

/// Deduplicated imports of every assembled block
#[derive(Debug, Default, Clone)]
pub struct ImportSet {
    buckets: BTreeMap<ImportCategory, Bucket>,
}

impl ImportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Bucket::is_empty)
    }

    /// Records an `import` or `from ... import` statement; other statements are ignored
    pub fn add_statement(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Import(names) => {
                for alias in names {
                    self.add_module(&render_alias(alias));
                }
            }
            StmtKind::ImportFrom { module, names, level } => {
                let module = format!("{}{}", ".".repeat(*level), module.as_deref().unwrap_or(""));
                for alias in names {
                    self.add_from(&module, &render_alias(alias));
                }
            }
            _ => {}
        }
    }

    pub fn add_module(&mut self, module: &str) {
        let category = ImportCategory::of(module);
        self.buckets.entry(category).or_default().modules.insert(module.to_string());
    }

    pub fn add_from(&mut self, module: &str, name: &str) {
        let category = ImportCategory::of(module);
        self.buckets
            .entry(category)
            .or_default()
            .from_names
            .entry(module.to_string())
            .or_default()
            .insert(name.to_string());
    }

    /// True when `name` is already bound by one of the collected imports
    pub fn binds(&self, name: &str) -> bool {
        self.buckets.values().any(|bucket| {
            bucket.modules.iter().any(|m| bound_name(m) == name)
                || bucket.from_names.values().flatten().any(|n| bound_name(n) == name)
        })
    }

    /// One import statement per line, groups separated by a blank line
    pub fn render(&self) -> String {
        let mut groups = Vec::new();
        for bucket in self.buckets.values().filter(|b| !b.is_empty()) {
            let mut lines = Vec::new();
            bucket.render(&mut lines);
            groups.push(lines.join("\n"));
        }
        groups.join("\n\n")
    }

    /// Individual `import x` / `from m import n` forms, one per bound name
    pub fn atoms(&self) -> BTreeSet<String> {
        let mut atoms = BTreeSet::new();
        for bucket in self.buckets.values() {
            for module in &bucket.modules {
                atoms.insert(format!("import {}", module));
            }
            for (module, names) in &bucket.from_names {
                for name in names {
                    atoms.insert(format!("from {} import {}", module, name));
                }
            }
        }
        atoms
    }

    /// Copy without the atoms present in `existing`
    pub fn without(&self, existing: &BTreeSet<String>) -> ImportSet {
        let mut remaining = ImportSet::new();
        for bucket in self.buckets.values() {
            for module in &bucket.modules {
                if !existing.contains(&format!("import {}", module)) {
                    remaining.add_module(module);
                }
            }
            for (module, names) in &bucket.from_names {
                for name in names {
                    if !existing.contains(&format!("from {} import {}", module, name)) {
                        remaining.add_from(module, name);
                    }
                }
            }
        }
        remaining
    }
}

/// Modules imported whole when the code uses them without importing
const COMMON_MODULES: &[&str] = &["math", "os", "sys", "json", "re", "random", "time"];

/// Bare names and the module they are imported from
const COMMON_NAMES: &[(&str, &str)] = &[
    ("sqrt", "math"),
    ("pi", "math"),
    ("sin", "math"),
    ("cos", "math"),
    ("tan", "math"),
    ("floor", "math"),
    ("ceil", "math"),
    ("defaultdict", "collections"),
    ("Counter", "collections"),
    ("deque", "collections"),
    ("namedtuple", "collections"),
    ("OrderedDict", "collections"),
    ("dataclass", "dataclasses"),
    ("field", "dataclasses"),
    ("Path", "pathlib"),
];

const TYPING_NAMES: &[&str] = &[
    "Any", "Callable", "Dict", "Iterable", "Iterator", "List", "Mapping", "Optional", "Sequence",
    "Set", "Tuple", "Union",
];

static DATETIME_MODULE_USE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bdatetime\.(datetime|date|time|timedelta|timezone)\b").unwrap());

/// Names loaded anywhere and names bound at module level
#[derive(Default)]
struct NameUsage {
    loaded: BTreeSet<String>,
    bound: BTreeSet<String>,
}

impl<'ast> Visitor<'ast> for NameUsage {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        if let ExprKind::Name { id, ctx: ExprContext::Load } = &expr.kind {
            self.loaded.insert(id.clone());
        }
        visit::walk_expr(self, expr);
    }
}

impl ImportSet {
    /// Adds imports for well-known modules and names the code uses but never binds.
    ///
    /// `module` is the assembled code without its import statements. Returns
    /// the rendered imports that were added.
    pub fn add_common_imports(&mut self, module: &Module, source: &str) -> Vec<String> {
        let mut usage = NameUsage::default();
        visit::walk_body(&mut usage, &module.body);
        for stmt in &module.body {
            match &stmt.kind {
                StmtKind::FunctionDef(def) => {
                    usage.bound.insert(def.name.clone());
                }
                StmtKind::ClassDef(def) => {
                    usage.bound.insert(def.name.clone());
                }
                StmtKind::Assign { targets, .. } => {
                    usage.bound.extend(targets.iter().filter_map(|t| t.as_name().map(String::from)))
                }
                StmtKind::AnnAssign { target, .. } => {
                    usage.bound.extend(target.as_name().map(String::from))
                }
                _ => {}
            }
        }

        let undefined: BTreeSet<String> = scope::analyze(module)
            .issues
            .into_iter()
            .filter(|issue| matches!(issue, ScopeIssue::Undefined { .. }))
            .map(|issue| issue.name().to_string())
            .collect();

        let mut added = Vec::new();
        for name in &undefined {
            if self.binds(name) {
                continue;
            }
            if COMMON_MODULES.contains(&name.as_str()) {
                self.add_module(name);
                added.push(format!("import {}", name));
            } else if name == "datetime" {
                if DATETIME_MODULE_USE.is_match(source) {
                    self.add_module("datetime");
                    added.push("import datetime".to_string());
                } else {
                    self.add_from("datetime", "datetime");
                    added.push("from datetime import datetime".to_string());
                }
            } else if let Some((_, from)) = COMMON_NAMES.iter().find(|(common, _)| common == name) {
                self.add_from(from, name);
                added.push(format!("from {} import {}", from, name));
            }
        }

        for name in TYPING_NAMES {
            let used = usage.loaded.contains(*name);
            if used && !usage.bound.contains(*name) && !self.binds(name) {
                self.add_from("typing", name);
                added.push(format!("from typing import {}", name));
            }
        }
        added
    }
}

fn render_alias(alias: &Alias) -> String {
    match &alias.asname {
        Some(asname) => format!("{} as {}", alias.name, asname),
        None => alias.name.clone(),
    }
}

/// Name bound by a rendered alias such as `numpy as np` or `os.path`
fn bound_name(rendered: &str) -> &str {
    match rendered.split_once(" as ") {
        Some((_, asname)) => asname,
        None => rendered.split('.').next().unwrap_or(rendered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::python::parse_module;

    fn collect(sources: &[&str]) -> ImportSet {
        let mut imports = ImportSet::new();
        for source in sources {
            for stmt in parse_module(source).unwrap().body {
                imports.add_statement(&stmt);
            }
        }
        imports
    }

    #[test]
    fn test_duplicate_imports_should_merge() {
        let imports = collect(&["import os\nimport os\nfrom typing import List", "import os\nfrom typing import Dict"]);
        assert_eq!(imports.render(), "import os\nfrom typing import Dict, List");
    }

    #[test]
    fn test_buckets_should_render_in_fixed_order() {
        let imports = collect(&["from . import helpers\nimport requests\nimport sys\nimport numpy as np"]);
        assert_eq!(imports.render(), "import sys\n\nimport numpy as np\nimport requests\n\nfrom . import helpers");
    }

    #[test]
    fn test_category_should_use_top_level_module() {
        assert_eq!(ImportCategory::of("os.path"), ImportCategory::Standard);
        assert_eq!(ImportCategory::of("pandas.io"), ImportCategory::ThirdParty);
        assert_eq!(ImportCategory::of(".models"), ImportCategory::Local);
    }

    #[test]
    fn test_binds_should_respect_aliases() {
        let imports = collect(&["import numpy as np\nfrom math import sqrt\nimport os.path"]);
        assert!(imports.binds("np"));
        assert!(imports.binds("sqrt"));
        assert!(imports.binds("os"));
        assert!(!imports.binds("numpy"));
    }

    #[test]
    fn test_common_imports_should_cover_unbound_usage() {
        let source = "def area(r: float) -> float:\n    return math.pi * r ** 2\n\ndef root(x) -> Optional[float]:\n    return sqrt(x)\n";
        let module = parse_module(source).unwrap();
        let mut imports = ImportSet::new();
        let added = imports.add_common_imports(&module, source);
        assert_eq!(added, vec!["import math", "from math import sqrt", "from typing import Optional"]);
        assert_eq!(imports.render(), "import math\nfrom math import sqrt\nfrom typing import Optional");
    }

    #[test]
    fn test_common_imports_should_skip_bound_names() {
        let source = "def run():\n    return json.dumps({})\n";
        let module = parse_module(source).unwrap();
        let mut imports = collect(&["import json"]);
        assert!(imports.add_common_imports(&module, source).is_empty());

        let shadowed = "def sqrt(x):\n    return x\n\nprint(sqrt(4))\n";
        let module = parse_module(shadowed).unwrap();
        assert!(ImportSet::new().add_common_imports(&module, shadowed).is_empty());
    }

    #[test]
    fn test_without_should_drop_existing_atoms() {
        let existing = collect(&["import os\nfrom typing import List"]).atoms();
        let fresh = collect(&["import os\nimport json\nfrom typing import List, Dict"]).without(&existing);
        assert_eq!(fresh.render(), "import json\nfrom typing import Dict");
    }
}
