//! Short random identifiers.
//!
//! Train configs get a 6 character id and manually cropped preprocess outputs
//! get a 4 character file name prefix. Both only need to be unique within a project.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a random alphanumeric string of `len` characters.
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_random_string_differs() {
        assert_ne!(random_string(16), random_string(16));
    }

    #[test]
    fn test_empty() {
        assert!(random_string(0).is_empty());
    }

    proptest! {
        #[test]
        fn test_random_string_length_and_charset(len in 0usize..64) {
            let s = random_string(len);
            prop_assert_eq!(s.len(), len);
            prop_assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }
}
