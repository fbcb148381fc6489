//! Named GLSL chunks and `#include` resolution.
use indexmap::{IndexMap, IndexSet};
use log::debug;
use smol_str::SmolStr;

use crate::{
    diagnostics::{CompileError, Diagnostics, ErrorCode},
    tokens::{contains_word, pragma},
};

/// A named, reusable GLSL source fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub name: String,
    /// The source with any deprecation pragmas removed.
    pub content: String,
    /// The message for `#pragma deprecate-chunk`.
    pub deprecation: Option<String>,
    /// Messages for `#pragma deprecate-identifier <name> <message>`.
    pub deprecated_identifiers: IndexMap<SmolStr, String>,
}

impl Chunk {
    pub fn new(name: &str, source: &str) -> Self {
        let mut deprecation = None;
        let mut deprecated_identifiers = IndexMap::new();

        let mut content = String::with_capacity(source.len());
        for line in source.lines() {
            match pragma(line) {
                Some(("deprecate-chunk", message)) => {
                    deprecation = Some(message.to_string());
                }
                Some(("deprecate-identifier", rest)) => {
                    let (ident, message) = rest
                        .split_once(char::is_whitespace)
                        .unwrap_or((rest, ""));
                    deprecated_identifiers.insert(ident.into(), message.trim().to_string());
                }
                _ => {
                    content += line;
                    content.push('\n');
                }
            }
        }
        if !source.ends_with('\n') {
            content.pop();
        }

        Self {
            name: name.to_string(),
            content,
            deprecation,
            deprecated_identifiers,
        }
    }
}

/// The chunks available to a compile.
///
/// The library is owned by the caller and only read during compilation.
#[derive(Debug, Default, Clone)]
pub struct ChunkLibrary {
    chunks: IndexMap<String, Chunk>,
}

impl ChunkLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chunk. Chunks are immutable once registered,
    /// so registering an existing name keeps the original and returns `false`.
    pub fn add_chunk(&mut self, name: &str, source: &str) -> bool {
        if self.chunks.contains_key(name) {
            debug!("Ignoring duplicate chunk {name:?}");
            false
        } else {
            self.chunks.insert(name.to_string(), Chunk::new(name, source));
            true
        }
    }

    pub fn get(&self, name: &str) -> Option<&Chunk> {
        self.chunks.get(name)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    fn find(&self, candidates: &[String]) -> Option<&Chunk> {
        candidates.iter().find_map(|c| self.chunks.get(c))
    }
}

/// Late bound chunk lookup for chunks missing from the [ChunkLibrary].
pub trait ChunkProvider {
    /// Find a chunk for the first matching name in `candidates`.
    fn find_chunk(&mut self, candidates: &[String]) -> Option<Chunk>;
}

/// A provider that never finds any chunks.
pub struct NoChunkProvider;

impl ChunkProvider for NoChunkProvider {
    fn find_chunk(&mut self, _candidates: &[String]) -> Option<Chunk> {
        None
    }
}

/// Names to try for an include like `#include <common/math>` in priority order.
pub fn alternative_chunk_paths(name: &str) -> Vec<String> {
    let mut paths = vec![name.to_string()];
    match name.strip_suffix(".chunk") {
        Some(stem) => paths.push(stem.to_string()),
        None => paths.push(format!("{name}.chunk")),
    }
    if let Some((_, file_name)) = name.rsplit_once('/') {
        paths.push(file_name.trim_end_matches(".chunk").to_string());
    }
    paths.dedup();
    paths
}

/// The result of include resolution.
#[derive(Debug, PartialEq)]
pub struct ResolvedSource {
    pub text: String,
    /// The names of all included chunks in inclusion order.
    pub record: IndexSet<String>,
}

/// Recursively replace `#include <name>` and `#include "name"` with chunk contents.
///
/// Text before and after the directive is applied to every included line.
/// Chunks already included are replaced with empty text.
pub fn resolve_includes(
    text: &str,
    library: &ChunkLibrary,
    provider: &mut dyn ChunkProvider,
    diagnostics: &mut Diagnostics,
) -> Result<ResolvedSource, CompileError> {
    let mut resolver = IncludeResolver {
        library,
        provider,
        session: IndexMap::new(),
        visited: IndexSet::new(),
    };
    let text = resolver.expand(text, None, diagnostics)?;
    Ok(ResolvedSource {
        text,
        record: resolver.visited,
    })
}

struct IncludeResolver<'a> {
    library: &'a ChunkLibrary,
    provider: &'a mut dyn ChunkProvider,
    /// Chunks found by the provider during this call.
    session: IndexMap<String, Chunk>,
    visited: IndexSet<String>,
}

impl IncludeResolver<'_> {
    fn expand(
        &mut self,
        text: &str,
        owner: Option<&str>,
        diagnostics: &mut Diagnostics,
    ) -> Result<String, CompileError> {
        self.check_identifiers(text, owner, diagnostics)?;

        let mut lines = Vec::new();
        for line in text.split('\n') {
            match parse_include(line) {
                Some((prefix, name, suffix)) => {
                    let chunk = self.find(name, diagnostics)?;
                    if self.visited.contains(&chunk.name) {
                        lines.push(String::new());
                        continue;
                    }
                    self.visited.insert(chunk.name.clone());

                    if let Some(message) = &chunk.deprecation {
                        diagnostics.error(
                            ErrorCode::DeprecatedChunk,
                            format!("chunk {} is deprecated: {message}", chunk.name),
                        )?;
                    }

                    let expanded = self.expand(&chunk.content, Some(&chunk.name), diagnostics)?;
                    for included in expanded.split('\n') {
                        lines.push(format!("{prefix}{included}{suffix}"));
                    }
                }
                None => lines.push(line.to_string()),
            }
        }
        Ok(lines.join("\n"))
    }

    fn find(&mut self, name: &str, diagnostics: &mut Diagnostics) -> Result<Chunk, CompileError> {
        let candidates = alternative_chunk_paths(name);
        if let Some(chunk) = self.library.find(&candidates) {
            return Ok(chunk.clone());
        }
        if let Some(chunk) = candidates.iter().find_map(|c| self.session.get(c)) {
            return Ok(chunk.clone());
        }
        match self.provider.find_chunk(&candidates) {
            Some(chunk) => {
                debug!("Found chunk {:?} for include {name:?}", chunk.name);
                self.session.insert(chunk.name.clone(), chunk.clone());
                Ok(chunk)
            }
            None => Err(diagnostics.fatal(
                ErrorCode::ChunkNotFound,
                format!("can not resolve '{name}'"),
            )),
        }
    }

    // Identifiers are only deprecated for code outside the chunk declaring them.
    fn check_identifiers(
        &self,
        text: &str,
        owner: Option<&str>,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), CompileError> {
        let chunks = self.library.iter().chain(self.session.values());
        for chunk in chunks.filter(|c| Some(c.name.as_str()) != owner) {
            for (ident, message) in &chunk.deprecated_identifiers {
                if contains_word(text, ident) {
                    diagnostics.error(
                        ErrorCode::DeprecatedIdentifier,
                        format!("identifier {ident} is deprecated: {message}"),
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Split a line like `  #include <name> // x` into the prefix, name, and suffix.
fn parse_include(line: &str) -> Option<(&str, &str, &str)> {
    let start = line.find("#include")?;
    let (prefix, rest) = line.split_at(start);
    if prefix.contains("//") {
        return None;
    }
    let rest = rest["#include".len()..].trim_start();
    let close = match rest.chars().next()? {
        '<' => '>',
        '"' => '"',
        _ => return None,
    };
    let end = rest[1..].find(close)? + 1;
    Some((prefix, rest[1..end].trim(), &rest[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    struct MapProvider(Vec<Chunk>);

    impl ChunkProvider for MapProvider {
        fn find_chunk(&mut self, candidates: &[String]) -> Option<Chunk> {
            self.0
                .iter()
                .find(|c| candidates.contains(&c.name))
                .cloned()
        }
    }

    fn resolve(text: &str, library: &ChunkLibrary) -> Result<ResolvedSource, CompileError> {
        let mut diagnostics = Diagnostics::new("test", true);
        resolve_includes(text, library, &mut NoChunkProvider, &mut diagnostics)
    }

    #[test]
    fn include_with_indentation() {
        let mut library = ChunkLibrary::new();
        library.add_chunk("common", "float a;\nfloat b;");

        let text = indoc! {"
            void main() {
              #include <common>
            }
        "};
        let resolved = resolve(text, &library).unwrap();
        assert_eq!(
            indoc! {"
                void main() {
                  float a;
                  float b;
                }
            "},
            resolved.text
        );
        assert_eq!(vec!["common"], resolved.record.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn include_nested_and_repeated() {
        let mut library = ChunkLibrary::new();
        library.add_chunk("a", "#include \"b\"\nA");
        library.add_chunk("b", "B");
        library.add_chunk("c", "#include <a>\n#include <b>\nC");

        let resolved = resolve("#include <c>\n#include <a>", &library).unwrap();
        assert_eq!("B\nA\n\nC\n", resolved.text);
        assert_eq!(
            vec!["c", "a", "b"],
            resolved.record.into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn include_cycle_terminates() {
        let mut library = ChunkLibrary::new();
        library.add_chunk("a", "#include <b>\nA");
        library.add_chunk("b", "#include <a>\nB");

        let resolved = resolve("#include <a>", &library).unwrap();
        assert_eq!("\nB\nA", resolved.text);
    }

    #[test]
    fn include_alternative_paths() {
        let mut library = ChunkLibrary::new();
        library.add_chunk("math.chunk", "M");
        library.add_chunk("lighting", "L");

        let resolved = resolve(
            "#include <math>\n#include <builtin/lighting.chunk>",
            &library,
        )
        .unwrap();
        assert_eq!("M\nL", resolved.text);
    }

    #[test]
    fn include_from_provider() {
        let library = ChunkLibrary::new();
        let mut provider = MapProvider(vec![Chunk::new("shading/pbr", "P")]);
        let mut diagnostics = Diagnostics::new("test", true);
        let resolved =
            resolve_includes("#include <shading/pbr>", &library, &mut provider, &mut diagnostics)
                .unwrap();
        assert_eq!("P", resolved.text);
    }

    #[test]
    fn include_missing_chunk() {
        let error = resolve("#include <missing>", &ChunkLibrary::new()).unwrap_err();
        assert_eq!(ErrorCode::ChunkNotFound, error.code);
    }

    #[test]
    fn include_deprecated_chunk() {
        let mut library = ChunkLibrary::new();
        library.add_chunk("old", "#pragma deprecate-chunk use new instead\nfloat x;");
        assert_eq!("float x;", library.get("old").unwrap().content);

        let error = resolve("#include <old>", &library).unwrap_err();
        assert_eq!(ErrorCode::DeprecatedChunk, error.code);
    }

    #[test]
    fn deprecated_identifier_outside_owner() {
        let mut library = ChunkLibrary::new();
        library.add_chunk(
            "lighting",
            "#pragma deprecate-identifier oldLight use newLight\n#define oldLight newLight",
        );

        assert!(resolve("#include <lighting>\nfloat a;", &library).is_ok());

        let error = resolve("#include <lighting>\nfloat a = oldLight;", &library).unwrap_err();
        assert_eq!(ErrorCode::DeprecatedIdentifier, error.code);
    }

    #[test]
    fn alternative_paths() {
        assert_eq!(
            vec!["a/b", "a/b.chunk", "b"],
            alternative_chunk_paths("a/b")
        );
        assert_eq!(vec!["x.chunk", "x"], alternative_chunk_paths("x.chunk"));
    }
}
