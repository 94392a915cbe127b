//! Spoken rendering of account numbers.
//!
//! Voice front ends read account ids digit by digit ("one two three …")
//! rather than as a cardinal number. Display only; never used for matching.

const DIGIT_WORDS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

/// One word per ASCII digit, in input order. Non-digit characters are skipped.
pub fn render(id: &str) -> Vec<&'static str> {
    id.chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| DIGIT_WORDS[d as usize])
        .collect()
}

/// [`render`] joined with single spaces.
pub fn render_spoken(id: &str) -> String {
    render(id).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twelve_digits_give_twelve_words() {
        let words = render("100942612345");
        assert_eq!(words.len(), 12);
        assert_eq!(
            words,
            vec![
                "one", "zero", "zero", "nine", "four", "two", "six", "one", "two", "three",
                "four", "five"
            ]
        );
    }

    #[test]
    fn every_digit_maps_to_its_word() {
        for (i, word) in render("0123456789").iter().enumerate() {
            assert_eq!(*word, DIGIT_WORDS[i]);
        }
    }

    #[test]
    fn spoken_form_is_space_separated() {
        assert_eq!(render_spoken("907"), "nine zero seven");
        assert_eq!(render_spoken("1234-5"), "one two three four five");
        assert_eq!(render_spoken(""), "");
    }
}
