//! The subset of CSS selectors that structural paths use: type, `#id`,
//! `.class`, `[attr=value]`, `:nth-child(n)` and the `>` child combinator.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<(String, String)>,
    pub nth_child: Option<usize>,
}

/// Parse a `>`-joined selector. `None` for anything outside the subset.
pub fn parse(selector: &str) -> Option<Vec<Compound>> {
    let parts: Vec<&str> = selector.split('>').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    parts.into_iter().map(parse_compound).collect()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &[char], pos: &mut usize) -> Option<String> {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    if *pos == start {
        None
    } else {
        Some(chars[start..*pos].iter().collect())
    }
}

fn parse_compound(input: &str) -> Option<Compound> {
    let chars: Vec<char> = input.chars().collect();
    let mut pos = 0;
    let mut compound = Compound::default();

    if chars.first().is_some_and(|c| *c == '*') {
        pos = 1;
    } else if chars.first().is_some_and(|c| is_ident_char(*c)) {
        compound.tag = Some(take_ident(&chars, &mut pos)?.to_lowercase());
    }

    while pos < chars.len() {
        match chars[pos] {
            '#' => {
                pos += 1;
                compound.id = Some(take_ident(&chars, &mut pos)?);
            }
            '.' => {
                pos += 1;
                compound.classes.push(take_ident(&chars, &mut pos)?);
            }
            '[' => {
                pos += 1;
                let name = take_ident(&chars, &mut pos)?;
                if chars.get(pos) != Some(&'=') {
                    return None;
                }
                pos += 1;
                let end = chars[pos..].iter().position(|c| *c == ']')? + pos;
                let raw: String = chars[pos..end].iter().collect();
                let value = raw.trim_matches(|c| c == '"' || c == '\'').to_string();
                compound.attributes.push((name, value));
                pos = end + 1;
            }
            ':' => {
                let rest: String = chars[pos..].iter().collect();
                let args = rest.strip_prefix(":nth-child(")?;
                let close = args.find(')')?;
                let n: usize = args[..close].trim().parse().ok()?;
                if n == 0 {
                    return None;
                }
                compound.nth_child = Some(n);
                pos += ":nth-child(".len() + close + 1;
            }
            _ => return None,
        }
    }

    if compound == Compound::default() && !input.starts_with('*') {
        return None;
    }
    Some(compound)
}
