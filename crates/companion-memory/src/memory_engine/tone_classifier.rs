//! Keyword and punctuation based tone detection
//!
//! Scores every non-neutral tone by counting trigger phrases found in the
//! lower-cased message, adjusts for punctuation and message length, then
//! gates the winner on confidence. Deterministic and infallible.

use crate::memory_db::schema::Tone;
use crate::utils::TextUtils;

/// Trigger phrases per tone. Table order is also the tie-break order.
const TONE_TRIGGERS: [(Tone, &[&str]); 7] = [
    (Tone::Sad, &[
        "sad", "depressed", "down", "upset", "crying", "tears", "feeling low",
        "unhappy", "melancholy", "gloomy", "hurt", "disappointed", "worried",
        "anxious", "stressed", "frustrated", "can't", "cannot", "won't",
    ]),
    (Tone::Excited, &[
        "excited", "amazing", "awesome", "wow", "yes!", "finally", "yay",
        "can't wait", "so happy", "thrilled", "incredible", "fantastic",
        "love it", "best", "greatest", "amazing news",
    ]),
    (Tone::Sarcastic, &[
        "sure", "obviously", "totally", "great", "wonderful", "perfect",
        "exactly what i wanted", "thanks a lot", "yeah right", "oh really",
    ]),
    (Tone::Angry, &[
        "angry", "mad", "furious", "hate", "annoyed", "irritated", "pissed",
        "stupid", "idiot", "sucks", "terrible", "worst", "disgusting",
    ]),
    (Tone::Playful, &[
        "haha", "lol", "lmao", "funny", "joke", "roast", "tease", "prank",
        "play", "game", "challenge", "bet", "wanna", "gonna",
    ]),
    (Tone::Formal, &[
        "sir", "madam", "please", "would you", "could you", "kindly",
        "appreciate", "grateful", "thank you very much", "regarding",
    ]),
    (Tone::Casual, &[
        "hey", "yo", "sup", "wassup", "dude", "bro", "lol", "omg",
        "idk", "tbh", "imo", "fr", "ngl",
    ]),
];

const LONG_MESSAGE_WORDS: usize = 30;
const SHORT_MESSAGE_WORDS: usize = 5;
const CONFIDENT_SCORE: u32 = 2;

/// Per-tone scores in table order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToneScores {
    scores: [u32; 7],
}

impl ToneScores {
    fn index(tone: Tone) -> Option<usize> {
        TONE_TRIGGERS.iter().position(|(t, _)| *t == tone)
    }

    pub fn get(&self, tone: Tone) -> u32 {
        Self::index(tone).map(|i| self.scores[i]).unwrap_or(0)
    }

    fn add(&mut self, tone: Tone, amount: u32) {
        if let Some(i) = Self::index(tone) {
            self.scores[i] += amount;
        }
    }

    /// Highest scoring tone; the earliest table entry wins a tie. `None` when
    /// every score is zero.
    pub fn dominant(&self) -> Option<(Tone, u32)> {
        let mut best: Option<(Tone, u32)> = None;
        for (i, (tone, _)) in TONE_TRIGGERS.iter().enumerate() {
            let score = self.scores[i];
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((*tone, score));
            }
        }
        best
    }
}

pub struct ToneClassifier;

impl ToneClassifier {
    /// Trigger counts only. Whole-word matches are a subset of substring
    /// matches on the lower-cased text, so one containment test covers both.
    pub fn keyword_scores(message: &str) -> ToneScores {
        let lower = message.to_lowercase();
        let mut scores = ToneScores::default();
        for (tone, triggers) in TONE_TRIGGERS.iter() {
            let matches = triggers.iter().filter(|t| lower.contains(*t)).count() as u32;
            scores.add(*tone, matches);
        }
        scores
    }

    /// Trigger counts plus the punctuation and length adjustments, before the
    /// confidence gate.
    pub fn score(message: &str) -> ToneScores {
        let mut scores = Self::keyword_scores(message);

        if message.contains("!!!") || message.contains("???") {
            scores.add(Tone::Excited, 2);
        }
        if message.contains("...") {
            scores.add(Tone::Sad, 1);
        }
        if message.contains('?') {
            scores.add(Tone::Casual, 1);
        }

        let words = TextUtils::space_word_count(message);
        if words > LONG_MESSAGE_WORDS && scores.get(Tone::Angry) == 0 {
            scores.add(Tone::Formal, 1);
        }
        if words < SHORT_MESSAGE_WORDS && scores.get(Tone::Excited) == 0 {
            scores.add(Tone::Casual, 1);
        }

        scores
    }

    pub fn detect_tone(message: &str) -> Tone {
        match Self::score(message).dominant() {
            None => Tone::Neutral,
            Some((tone, score)) if score >= CONFIDENT_SCORE => tone,
            // A single negative signal is still worth reacting to.
            Some((tone @ (Tone::Sad | Tone::Angry), 1)) => tone,
            Some(_) => Tone::Neutral,
        }
    }

    /// `previous` is `None` on the first turn of a session.
    pub fn detect_tone_shift(current: Tone, previous: Option<Tone>) -> bool {
        matches!(previous, Some(prev) if prev != current)
    }
}
