//! Lexical extraction of import directives and version pragmas.
//!
//! Extraction is purely lexical: the scanner skips over comments and string literals, so an
//! `import` spelled inside either never counts as a directive. Anything beyond imports and
//! `pragma solidity` statements is ignored, no semantic analysis happens here.

/// The data extracted from a single solidity file
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SolData {
    /// all raw import paths in order of appearance
    pub imports: Vec<String>,
    /// all `pragma solidity <range>` values in order of appearance
    pub version_pragmas: Vec<String>,
}

impl SolData {
    /// Scans the content for import directives and version pragmas
    pub fn parse(content: &str) -> Self {
        let mut data = SolData::default();
        let mut lexer = Lexer::new(content);
        while let Some(token) = lexer.next_token() {
            match token {
                Token::Ident("import") => {
                    if let Some(path) = lexer.import_path() {
                        data.imports.push(path);
                    }
                }
                Token::Ident("pragma") => {
                    if let Some(Token::Ident("solidity")) = lexer.next_token() {
                        let value = lexer.take_until_semicolon();
                        if !value.is_empty() {
                            data.version_pragmas.push(value);
                        }
                    }
                }
                _ => {}
            }
        }
        data
    }
}

#[derive(Debug)]
enum Token<'a> {
    Ident(&'a str),
    Str(String),
    Punct(u8),
}

/// A minimal scanner over the raw file content.
///
/// Comments are consumed as whitespace. String literals are consumed as a single token, which
/// guarantees that keywords inside them are never matched.
struct Lexer<'a> {
    content: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(content: &'a str) -> Self {
        Self { content, bytes: content.as_bytes(), pos: 0 }
    }

    fn next_token(&mut self) -> Option<Token<'a>> {
        self.skip_trivia();
        let start = self.pos;
        let byte = *self.bytes.get(self.pos)?;
        match byte {
            b'"' | b'\'' => Some(Token::Str(self.string_literal(byte))),
            b if b == b'_' || b == b'$' || b.is_ascii_alphabetic() => {
                while self
                    .bytes
                    .get(self.pos)
                    .map(|b| *b == b'_' || *b == b'$' || b.is_ascii_alphanumeric())
                    .unwrap_or_default()
                {
                    self.pos += 1;
                }
                Some(Token::Ident(&self.content[start..self.pos]))
            }
            b => {
                self.pos += 1;
                Some(Token::Punct(b))
            }
        }
    }

    /// Consumes the rest of an import statement and returns its path, this covers
    /// `import "p";`, `import "p" as NS;`, `import * as NS from "p";` and
    /// `import {A as B} from "p";`
    fn import_path(&mut self) -> Option<String> {
        loop {
            match self.next_token()? {
                Token::Str(path) => return Some(path),
                Token::Punct(b';') => return None,
                _ => {}
            }
        }
    }

    /// Returns the trimmed raw content up to (excluding) the next `;`
    fn take_until_semicolon(&mut self) -> String {
        let start = self.pos;
        while self.bytes.get(self.pos).map(|b| *b != b';').unwrap_or_default() {
            self.pos += 1;
        }
        let value = self.content[start..self.pos].trim().to_string();
        // consume the `;` itself
        if self.pos < self.bytes.len() {
            self.pos += 1;
        }
        value
    }

    fn string_literal(&mut self, quote: u8) -> String {
        // skip the opening quote
        self.pos += 1;
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b == b'\\' {
                self.pos += 2;
                continue
            }
            if b == quote {
                break
            }
            self.pos += 1;
        }
        let end = self.pos.min(self.bytes.len());
        let value = self.content[start..end].to_string();
        if self.pos < self.bytes.len() {
            // skip the closing quote
            self.pos += 1;
        }
        value
    }

    fn skip_trivia(&mut self) {
        loop {
            match (self.bytes.get(self.pos), self.bytes.get(self.pos + 1)) {
                (Some(b), _) if b.is_ascii_whitespace() => self.pos += 1,
                (Some(b'/'), Some(b'/')) => {
                    while self.bytes.get(self.pos).map(|b| *b != b'\n').unwrap_or_default() {
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    self.pos += 2;
                    while self.pos < self.bytes.len() {
                        if self.bytes[self.pos] == b'*' && self.bytes.get(self.pos + 1) == Some(&b'/')
                        {
                            self.pos += 2;
                            break
                        }
                        self.pos += 1;
                    }
                }
                _ => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_parse_curly_imports() {
        let content = r#"
import { T } from "../Test.sol";
import {ReentrancyGuard} from "@openzeppelin/contracts/utils/ReentrancyGuard.sol";
import {DsTest} from "ds-test/test.sol";
"#;
        let data = SolData::parse(content);
        assert_eq!(
            data.imports,
            vec![
                "../Test.sol".to_string(),
                "@openzeppelin/contracts/utils/ReentrancyGuard.sol".to_string(),
                "ds-test/test.sol".to_string(),
            ]
        );
    }

    #[test]
    fn can_parse_alias_and_glob_imports() {
        let content = r#"
import "./A.sol" as A;
import * as B from './B.sol';
"#;
        let data = SolData::parse(content);
        assert_eq!(data.imports, vec!["./A.sol".to_string(), "./B.sol".to_string()]);
    }

    #[test]
    fn can_parse_version_pragmas() {
        let content = r"
pragma solidity ^0.8.0;
pragma experimental ABIEncoderV2;
pragma solidity >=0.4.22 <0.9.0;
";
        let data = SolData::parse(content);
        assert_eq!(
            data.version_pragmas,
            vec!["^0.8.0".to_string(), ">=0.4.22 <0.9.0".to_string()]
        );
    }

    #[test]
    fn ignores_directives_in_comments_and_strings() {
        let content = r#"
// import "./InLineComment.sol";
/* import "./InBlockComment.sol";
   pragma solidity ^0.1.0;
*/
contract A {
    string constant hint = "import \"./InString.sol\";";
}
import "./Real.sol";
pragma solidity ^0.8.0;
"#;
        let data = SolData::parse(content);
        assert_eq!(data.imports, vec!["./Real.sol".to_string()]);
        assert_eq!(data.version_pragmas, vec!["^0.8.0".to_string()]);
    }

    #[test]
    fn lexical_scan_matches_the_regex_fallback() {
        let content = r#"
pragma solidity ^0.8.0;
import "hardhat/console.sol";
import "../contract/Contract.sol";
"#;
        let data = SolData::parse(content);
        let regex_imports = crate::utils::find_import_paths(content)
            .map(|m| m.as_str().to_string())
            .collect::<Vec<_>>();
        assert_eq!(data.imports, regex_imports);
        assert_eq!(
            data.version_pragmas.first().map(|s| s.as_str()),
            crate::utils::find_version_pragma(content).map(|m| m.as_str())
        );
    }
}
