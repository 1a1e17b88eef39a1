/// Replace `${VAR}` placeholders with values from the process environment.
///
/// Unknown variables and unterminated placeholders are kept verbatim so the
/// parser reports them in context instead of silently producing an empty
/// value.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match (!name.is_empty()).then(|| lookup(name)).flatten() {
            Some(value) => out.push_str(&value),
            None => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn lookup(name: &str) -> Option<String> {
        match name {
            "MQTG_TOKEN" => Some("123:abc".into()),
            "MQTG_AGE" => Some("45".into()),
            _ => None,
        }
    }

    #[rstest]
    #[case("token = \"${MQTG_TOKEN}\"", "token = \"123:abc\"")]
    #[case("${MQTG_AGE}${MQTG_AGE}", "4545")]
    #[case("${MQTG_MISSING}", "${MQTG_MISSING}")]
    #[case("${}", "${}")]
    #[case("broken ${MQTG_TOKEN", "broken ${MQTG_TOKEN")]
    #[case("no placeholders", "no placeholders")]
    fn substitution(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(substitute_with(input, lookup), expected);
    }
}
