//! Import resolution for the driver.
//!
//! Every non-foreign import is located on disk, compiled as a library
//! unit (recursively resolving its own imports first) and handed back
//! to the core as a `ModuleFragment` holding its exports.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use pyrinas_core::ast::Import;
use pyrinas_core::symbols::{ModuleFragment, SymbolOrigin};
use pyrinas_core::{CompileOptions, collect_imports, compile_c};
use walkdir::WalkDir;

use crate::foreign;

/// Extension of Pyrinas source files.
pub const SOURCE_EXTENSION: &str = "pyr";

/// Imports that only carry typing markers.
const MARKER_MODULES: &[&str] = &["typing"];

/// A dependency compiled on behalf of the root unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    /// Dotted import path the module was first reached through.
    pub path: String,
    pub file: PathBuf,
    pub c_source: String,
}

impl CompiledModule {
    /// File name of the generated C, e.g. `geometry_shapes.c`.
    pub fn c_file_name(&self) -> String {
        format!("{}.c", self.path.replace('.', "_"))
    }
}

pub struct ModuleResolver {
    roots: Vec<PathBuf>,
    runtime_header: String,
    verbose: bool,
    /// Files currently being compiled, outermost first.
    active: Vec<PathBuf>,
    /// Exports of every file compiled so far.
    loaded: Vec<(PathBuf, ModuleFragment)>,
    compiled: Vec<CompiledModule>,
    /// Native libraries required by foreign imports, e.g. `m`.
    libraries: Vec<String>,
}

impl ModuleResolver {
    /// Search `base` and its `modules/`, `lib/` and `src/` folders,
    /// then every extra directory in order.
    pub fn new(base: &Path, extra: &[PathBuf], runtime_header: &str, verbose: bool) -> Self {
        let mut roots = vec![
            base.to_path_buf(),
            base.join("modules"),
            base.join("lib"),
            base.join("src"),
        ];
        roots.extend(extra.iter().cloned());
        ModuleResolver {
            roots,
            runtime_header: runtime_header.to_string(),
            verbose,
            active: Vec::new(),
            loaded: Vec::new(),
            compiled: Vec::new(),
            libraries: Vec::new(),
        }
    }

    /// Resolve every import of `source` into fragments for the core.
    ///
    /// `current` is the file holding `source`, used both as the first
    /// search directory and for cycle detection.
    pub fn fragments_for(
        &mut self,
        source: &str,
        current: Option<&Path>,
    ) -> Result<Vec<ModuleFragment>> {
        let imports = collect_imports(source).with_context(|| match current {
            Some(file) => format!("failed to read imports of {}", file.display()),
            None => "failed to read imports".to_string(),
        })?;

        let mut fragments: Vec<ModuleFragment> = Vec::new();
        for import in imports {
            let path = import.module_path();
            if MARKER_MODULES.contains(&path.as_str())
                || fragments.iter().any(|fragment| fragment.path == path)
            {
                continue;
            }
            fragments.push(self.load(&import, current)?);
        }
        Ok(fragments)
    }

    fn load(&mut self, import: &Import, current: Option<&Path>) -> Result<ModuleFragment> {
        let path = import.module_path();
        if foreign::is_foreign(&import.module) {
            let fragment = foreign::fragment(&import.module)?;
            for library in fragment
                .symbols
                .iter()
                .filter_map(|symbol| match &symbol.origin {
                    SymbolOrigin::Foreign(origin) => origin.library.clone(),
                    _ => None,
                })
            {
                if !self.libraries.contains(&library) {
                    self.libraries.push(library);
                }
            }
            return Ok(fragment);
        }

        let file = self.locate(&import.module, current)?;
        if let Some(position) = self.active.iter().position(|active| *active == file) {
            let mut cycle: Vec<String> = self.active[position..]
                .iter()
                .map(|active| active.display().to_string())
                .collect();
            cycle.push(file.display().to_string());
            bail!("import cycle: {}", cycle.join(" -> "));
        }
        if let Some((_, fragment)) = self.loaded.iter().find(|(loaded, _)| *loaded == file) {
            return Ok(retag(fragment.clone(), &path));
        }

        if self.verbose {
            eprintln!("compiling module {path} ({})", file.display());
        }
        let source = fs::read_to_string(&file)
            .with_context(|| format!("failed to read module file {}", file.display()))?;

        self.active.push(file.clone());
        let result = self.compile_module(&path, &file, &source);
        self.active.pop();
        let fragment = result?;

        self.loaded.push((file, fragment.clone()));
        Ok(fragment)
    }

    fn compile_module(&mut self, path: &str, file: &Path, source: &str) -> Result<ModuleFragment> {
        let dependencies = self.fragments_for(source, Some(file))?;
        let options = CompileOptions {
            runtime_header: self.runtime_header.clone(),
            ..CompileOptions::library()
        };
        let artifact = compile_c(source, &options, &dependencies)
            .with_context(|| format!("failed to compile module {path} ({})", file.display()))?;

        self.compiled.push(CompiledModule {
            path: path.to_string(),
            file: file.to_path_buf(),
            c_source: artifact.c_source,
        });
        Ok(retag(ModuleFragment::new(path, artifact.exports), path))
    }

    /// Find the file for a dotted import path.
    pub fn locate(&self, module: &[String], current: Option<&Path>) -> Result<PathBuf> {
        let Some(last) = module.last() else {
            bail!("empty module path");
        };
        let relative: PathBuf = module.iter().collect();
        let candidates = [
            relative.with_extension(SOURCE_EXTENSION),
            relative.join(format!("main.{SOURCE_EXTENSION}")),
            relative.join(format!("index.{SOURCE_EXTENSION}")),
            relative.join(format!("{last}.{SOURCE_EXTENSION}")),
        ];

        let mut dirs: Vec<PathBuf> = Vec::new();
        if let Some(parent) = current.and_then(Path::parent) {
            dirs.push(parent.to_path_buf());
        }
        dirs.extend(self.roots.iter().cloned());

        for dir in &dirs {
            for candidate in &candidates {
                let file = dir.join(candidate);
                if file.is_file() {
                    return canonical(&file);
                }
            }
        }

        let wanted = format!("{last}.{SOURCE_EXTENSION}");
        for dir in dirs.iter().filter(|dir| dir.is_dir()) {
            let found = WalkDir::new(dir)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .find(|entry| entry.file_type().is_file() && entry.file_name() == wanted.as_str());
            if let Some(entry) = found {
                return canonical(entry.path());
            }
        }

        let searched: Vec<String> = dirs.iter().map(|dir| dir.display().to_string()).collect();
        bail!(
            "module '{}' not found in search paths: {}",
            module.join("."),
            searched.join(", ")
        )
    }

    /// Dependencies in the order they finished compiling.
    pub fn compiled(&self) -> &[CompiledModule] {
        &self.compiled
    }

    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("failed to resolve path {}", path.display()))
}

fn retag(mut fragment: ModuleFragment, path: &str) -> ModuleFragment {
    fragment.path = path.to_string();
    for symbol in &mut fragment.symbols {
        symbol.origin = SymbolOrigin::Module(path.to_string());
    }
    fragment
}

/// Whether a source file is a library by location alone.
pub fn is_library_path(path: &Path) -> bool {
    let in_modules = path
        .components()
        .any(|component| component.as_os_str() == "modules");
    let utils = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with("_utils.pyr"));
    in_modules || utils
}
