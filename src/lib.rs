// alignment module
pub mod align {
    pub mod peak;
    pub mod similarity;
    pub mod matching;
    pub mod chain;
    pub mod clique;
    pub mod run;
}

// Re-export commonly used types
pub use align::peak::{Peak, PeakId, PeakList, AlignmentError};
pub use align::similarity::{Polarity, Similarity};
pub use align::matching::MatchParams;
pub use align::run::{Alignment, PeakAligner};
