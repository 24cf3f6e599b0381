//! Closing remarks spoken after the last slide.

use rand::Rng;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const CLOSING_REMARKS: &[&str] = &[
    "So, does everything look good? Great! Because I can't hear you. I just read off the presentation.",
    "And that's the last slide! If you have questions, please write them on a sticky note and throw them at the screen.",
    "Presentation complete! I'd take a bow, but I don't have a body. Or legs. Or anything, really.",
    "That's all folks! I'd ask for applause, but honestly, the silence is less awkward for both of us.",
    "Any questions? Just kidding. I literally cannot process your answers. Good luck out there!",
    "And we're done! If that didn't make sense, don't worry. I just read the words, I don't understand them either.",
    "Thank you for listening! Or sleeping. Either way, my job here is done.",
    "End of presentation! Fun fact: I rehearsed this zero times and still nailed it. Probably.",
    "That concludes today's slides. Remember, if you didn't learn anything, that's a content problem, not a me problem.",
    "And scene! I hope that was informative. If not, at least it was audible?",
    "Presentation over! I'd stick around for the Q and A, but I have another deck to read in five minutes.",
    "We made it to the end! High five! Oh wait, I'm software. Air five? No air either. Never mind.",
    "That's a wrap! If you need me to read it again, just hit F5. I'll be here. I'm always here.",
    "All done! I hope I pronounced everything correctly. If not, blame the person who made the slides.",
    "And that's the presentation! Now if you'll excuse me, I need to go recharge. Just kidding, I run on pure determination.",
];

/// How the closing remark is picked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RemarkPolicy {
    /// Walk the table in order, continuing across sessions.
    #[default]
    Rotate,
    Random,
    Fixed(String),
}

impl FromStr for RemarkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rotate" => Ok(Self::Rotate),
            "random" => Ok(Self::Random),
            other => match other.strip_prefix("fixed:") {
                Some(text) if !text.trim().is_empty() => Ok(Self::Fixed(text.trim().to_string())),
                _ => Err(format!(
                    "unknown remark policy '{}' (expected rotate, random or fixed:<text>)",
                    other
                )),
            },
        }
    }
}

/// Remark picker. Clones share the rotation cursor.
#[derive(Clone, Debug)]
pub struct ClosingRemarks {
    policy: RemarkPolicy,
    cursor: Arc<AtomicUsize>,
}

impl Default for ClosingRemarks {
    fn default() -> Self {
        Self::new(RemarkPolicy::default())
    }
}

impl ClosingRemarks {
    pub fn new(policy: RemarkPolicy) -> Self {
        Self {
            policy,
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn policy(&self) -> &RemarkPolicy {
        &self.policy
    }

    pub fn next_remark(&self) -> String {
        match &self.policy {
            RemarkPolicy::Rotate => {
                let i = self.cursor.fetch_add(1, Ordering::Relaxed);
                CLOSING_REMARKS[i % CLOSING_REMARKS.len()].to_string()
            }
            RemarkPolicy::Random => {
                let i = rand::rng().random_range(0..CLOSING_REMARKS.len());
                CLOSING_REMARKS[i].to_string()
            }
            RemarkPolicy::Fixed(text) => text.clone(),
        }
    }
}
