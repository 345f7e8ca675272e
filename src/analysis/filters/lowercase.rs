use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

pub struct LowercaseFilter;

impl TokenFilter for LowercaseFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .map(|mut token| {
                if token.text.chars().any(char::is_uppercase) {
                    token.text = token.text.to_lowercase();
                }
                token
            })
            .collect()
    }

    fn name(&self) -> &str {
        "lowercase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_keeps_positions() {
        let tokens = vec![Token::new("Quick".into(), 0, 0), Token::new("FOX".into(), 1, 6)];
        let out = LowercaseFilter.filter(tokens);
        assert_eq!(out[0].text, "quick");
        assert_eq!(out[1].text, "fox");
        assert_eq!(out[1].position, 1);
        assert_eq!(out[1].offset, 6);
    }
}
