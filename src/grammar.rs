use crate::error::GrammarError;
use libloading::Library;
use std::path::Path;
use std::sync::Arc;
use tree_sitter::{Language, Parser};
use tree_sitter_language::LanguageFn;

const JAVA_SYMBOL: &[u8] = b"tree_sitter_java\0";

type LanguageConstructor = unsafe extern "C" fn() -> *const ();

/// Handle to the Java grammar. Cheap to clone; each worker builds its own `Parser`.
#[derive(Clone)]
pub struct JavaGrammar {
    language: Language,
    // Keeps an externally loaded grammar mapped while any `Language` built from it lives.
    _library: Option<Arc<Library>>,
}

impl JavaGrammar {
    /// Load the Java grammar and check it against the linked tree-sitter runtime.
    ///
    /// Without `grammar_path` the bundled grammar is used. With it, the path must
    /// name a compiled grammar library exporting `tree_sitter_java`.
    pub fn load(grammar_path: Option<&Path>) -> Result<Self, GrammarError> {
        let grammar = match grammar_path {
            Some(path) => Self::from_library(path)?,
            None => Self {
                language: tree_sitter_java::LANGUAGE.into(),
                _library: None,
            },
        };
        grammar.parser()?;
        tracing::debug!(
            abi = grammar.language.abi_version(),
            external = grammar._library.is_some(),
            "java grammar loaded"
        );
        Ok(grammar)
    }

    pub fn bundled() -> Result<Self, GrammarError> {
        Self::load(None)
    }

    fn from_library(path: &Path) -> Result<Self, GrammarError> {
        let load_error = |reason: String| GrammarError::Load {
            path: path.to_path_buf(),
            reason,
        };
        // SAFETY: loading runs the library's initialisers; the path is an operator-supplied grammar.
        let library = unsafe { Library::new(path) }.map_err(|err| load_error(err.to_string()))?;
        // SAFETY: tree-sitter grammars export `tree_sitter_<name>` with this signature.
        let constructor: LanguageConstructor = unsafe {
            *library
                .get::<LanguageConstructor>(JAVA_SYMBOL)
                .map_err(|err| load_error(err.to_string()))?
        };
        // SAFETY: the constructor stays valid while `library` is held by the returned grammar.
        let language = Language::new(unsafe { LanguageFn::from_raw(constructor) });
        Ok(Self {
            language,
            _library: Some(Arc::new(library)),
        })
    }

    pub fn parser(&self) -> Result<Parser, GrammarError> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|err| GrammarError::Incompatible(err.to_string()))?;
        Ok(parser)
    }
}
