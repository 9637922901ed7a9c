use crate::ast::{Import, StmtKind};
use crate::codegen_c::generate;
use crate::error::CoreError;
use crate::lexer::{dump_tokens, tokenize};
use crate::parser::{parse, parse_tokens};
use crate::symbols::{ModuleFragment, Symbol};
use crate::typecheck::analyze;

/// Whether the unit being compiled is a program or an imported library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitKind {
    /// Must define `main`; its C output carries the entry point.
    #[default]
    Program,
    /// Compiled on behalf of an importer; no entry point is required or emitted.
    Library,
}

/// Knobs that influence a single compilation.
///
/// The dump flags only add text to [`Dumps`]; they never change the
/// generated C.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub unit: UnitKind,
    /// Header included for the `Result` runtime, e.g. `pyrinas.h`.
    pub runtime_header: String,
    pub dump_tokens: bool,
    pub dump_ast: bool,
    pub dump_output: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            unit: UnitKind::Program,
            runtime_header: "pyrinas.h".to_string(),
            dump_tokens: false,
            dump_ast: false,
            dump_output: false,
        }
    }
}

impl CompileOptions {
    pub fn library() -> Self {
        CompileOptions {
            unit: UnitKind::Library,
            ..CompileOptions::default()
        }
    }
}

/// Diagnostic renderings requested through [`CompileOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dumps {
    pub tokens: Option<String>,
    pub ast: Option<String>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationArtifact {
    pub c_source: String,
    /// Declarations an importer of this unit may use.
    pub exports: Vec<Symbol>,
    pub dumps: Dumps,
}

/// Run the whole pipeline on one unit of source text.
///
/// `modules` holds the already-resolved fragments for every import the
/// unit makes; the core never looks for them itself.
pub fn compile_c(
    source: &str,
    options: &CompileOptions,
    modules: &[ModuleFragment],
) -> Result<CompilationArtifact, CoreError> {
    let mut dumps = Dumps::default();

    let tokens = tokenize(source)?;
    if options.dump_tokens {
        dumps.tokens = Some(dump_tokens(&tokens));
    }

    let module = parse_tokens(tokens)?;
    if options.dump_ast {
        dumps.ast = Some(module.dump());
    }

    let table = analyze(&module, options.unit, modules)?;
    let c_source = generate(&module, &table, &options.runtime_header, options.unit)?;
    if options.dump_output {
        dumps.output = Some(c_source.clone());
    }

    Ok(CompilationArtifact {
        c_source,
        exports: table.exports(""),
        dumps,
    })
}

/// List the imports of a unit so a driver can resolve them first.
///
/// Only lexing and parsing run; an unreadable unit reports the same
/// error a full compilation would.
pub fn collect_imports(source: &str) -> Result<Vec<Import>, CoreError> {
    let module = parse(source)?;
    Ok(module
        .body
        .into_iter()
        .filter_map(|stmt| match stmt.kind {
            StmtKind::Import(import) => Some(import),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::symbols::{ForeignOrigin, SymbolKind};
    use crate::types::Type;

    #[test]
    fn compiles_minimal_program() {
        let artifact = compile_c(
            "def main():\n    print(1)\n",
            &CompileOptions::default(),
            &[],
        )
        .expect("compile");
        assert!(artifact.c_source.contains("#include \"pyrinas.h\""));
        assert!(artifact.c_source.contains("printf(\"%d\\n\", 1);"));
        assert!(artifact.c_source.contains("int main(void)"));
        assert_eq!(artifact.dumps, Dumps::default());
    }

    #[test]
    fn reports_the_failing_stage() {
        let options = CompileOptions::default();
        let cases = [
            ("def main():\n    x = 1 ! 2\n", Stage::Lex),
            ("def main():\n    if True:\n        pass\n  pass\n", Stage::Lex),
            ("def main()\n    pass\n", Stage::Parse),
            ("def main():\n    break\n", Stage::Semantic),
            (
                "class Shape:\n    def area(self) -> float:\n        pass\n\ndef make(s: Shape):\n    pass\n\ndef main():\n    pass\n",
                Stage::CodeGen,
            ),
        ];
        for (source, stage) in cases {
            let err = compile_c(source, &options, &[]).unwrap_err();
            assert_eq!(err.stage(), stage, "{source}: {err}");
        }
    }

    #[test]
    fn fills_requested_dumps() {
        let options = CompileOptions {
            dump_tokens: true,
            dump_ast: true,
            dump_output: true,
            ..CompileOptions::default()
        };
        let artifact = compile_c("def main():\n    print(1)\n", &options, &[]).expect("compile");
        let tokens = artifact.dumps.tokens.expect("token dump");
        assert!(tokens.contains("NUMBER(\"1\")"));
        assert!(artifact.dumps.ast.expect("ast dump").starts_with("Module\n"));
        assert_eq!(artifact.dumps.output.as_deref(), Some(artifact.c_source.as_str()));
    }

    #[test]
    fn output_is_deterministic() {
        let source = "class P:\n    x: int\n\ndef f(p: 'ptr[P]') -> int:\n    return p.x\n\ndef main():\n    p: P = P()\n    print(f(addr(p)))\n";
        let options = CompileOptions::default();
        let first = compile_c(source, &options, &[]).expect("first");
        let second = compile_c(source, &options, &[]).expect("second");
        assert_eq!(first.c_source, second.c_source);
    }

    #[test]
    fn libraries_export_public_declarations() {
        let source = "SCALE: Final[int] = 3\n_hidden: Final[int] = 1\n\ndef triple(x: int) -> int:\n    return x * SCALE\n";
        let artifact = compile_c(source, &CompileOptions::library(), &[]).expect("library");
        assert!(!artifact.c_source.contains("int main"));
        let names: Vec<&str> = artifact.exports.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["SCALE", "triple"]);
    }

    #[test]
    fn links_against_imported_fragments() {
        let math = ModuleFragment::new(
            "c.math",
            vec![Symbol::foreign_function(
                "sqrt",
                vec![Type::Float],
                Type::Float,
                ForeignOrigin {
                    header: "math.h".to_string(),
                    library: Some("m".to_string()),
                },
            )],
        );
        let utils = ModuleFragment::new(
            "utils",
            vec![Symbol::function("triple", vec![Type::Int], Type::Int)],
        );
        let source = "from c.math import sqrt\nimport utils\n\ndef main():\n    print(sqrt(2.0))\n    print(utils.triple(2))\n";
        let artifact =
            compile_c(source, &CompileOptions::default(), &[math, utils]).expect("compile");
        assert!(artifact.c_source.contains("#include <math.h>"));
        assert!(artifact.c_source.contains("int triple(int);"));
        assert!(artifact.c_source.contains("printf(\"%d\\n\", triple(2));"));
        assert!(artifact
            .exports
            .iter()
            .all(|s| !matches!(s.kind, SymbolKind::Module { .. })));
    }

    #[test]
    fn collects_imports_in_order() {
        let imports =
            collect_imports("import geometry.shapes\nfrom c.math import sqrt, pow\n\ndef main():\n    pass\n")
                .expect("imports");
        let paths: Vec<String> = imports.iter().map(Import::module_path).collect();
        assert_eq!(paths, vec!["geometry.shapes", "c.math"]);
        assert_eq!(imports[1].names, vec!["sqrt".to_string(), "pow".to_string()]);
    }
}
