//! Flat/long/short position state machine and its transaction records.

use std::fmt;

use chrono::NaiveDateTime;

use crate::domain::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Flat,
    Long,
    Short,
}

impl Position {
    pub fn as_i8(self) -> i8 {
        match self {
            Position::Flat => 0,
            Position::Long => 1,
            Position::Short => -1,
        }
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.as_i8())
    }

    /// Position implied by a transaction comment: "closing" wins over "long"/"short".
    pub fn from_comment(comment: &str) -> Self {
        let lower = comment.to_ascii_lowercase();
        if lower.contains("closing") {
            Position::Flat
        } else if lower.contains("long") {
            Position::Long
        } else if lower.contains("short") {
            Position::Short
        } else {
            Position::Flat
        }
    }

    pub fn is_flat(self) -> bool {
        self == Position::Flat
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Flat => write!(f, "flat"),
            Position::Long => write!(f, "long"),
            Position::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Long,
    Short,
    ClosingLong,
    ClosingShort,
}

impl TransactionKind {
    pub fn comment(self) -> &'static str {
        match self {
            TransactionKind::Long => "Long",
            TransactionKind::Short => "Short",
            TransactionKind::ClosingLong => "Closing Long",
            TransactionKind::ClosingShort => "Closing Short",
        }
    }

    /// Order direction: +1 buys, -1 sells.
    pub fn action(self) -> i8 {
        match self {
            TransactionKind::Long | TransactionKind::ClosingShort => 1,
            TransactionKind::Short | TransactionKind::ClosingLong => -1,
        }
    }

    pub fn from_comment(comment: &str) -> Option<Self> {
        match comment.trim().to_ascii_lowercase().as_str() {
            "long" => Some(TransactionKind::Long),
            "short" => Some(TransactionKind::Short),
            "closing long" => Some(TransactionKind::ClosingLong),
            "closing short" => Some(TransactionKind::ClosingShort),
            _ => None,
        }
    }

    /// Position held after this transaction.
    pub fn resulting_position(self) -> Position {
        match self {
            TransactionKind::Long => Position::Long,
            TransactionKind::Short => Position::Short,
            TransactionKind::ClosingLong | TransactionKind::ClosingShort => Position::Flat,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub timestamp: NaiveDateTime,
    pub asset: String,
    pub kind: TransactionKind,
}

impl Transaction {
    pub fn action(&self) -> i8 {
        self.kind.action()
    }

    pub fn comment(&self) -> &'static str {
        self.kind.comment()
    }
}

/// Owns the position of one asset.
#[derive(Debug, Clone)]
pub struct PositionMachine {
    asset: String,
    position: Position,
}

impl PositionMachine {
    pub fn new(asset: impl Into<String>) -> Self {
        PositionMachine {
            asset: asset.into(),
            position: Position::Flat,
        }
    }

    /// Resumes from the most recent transaction of the asset, if any.
    pub fn from_last_transaction(asset: impl Into<String>, last: Option<&Transaction>) -> Self {
        PositionMachine {
            asset: asset.into(),
            position: last.map_or(Position::Flat, |tx| Position::from_comment(tx.comment())),
        }
    }

    pub fn with_position(asset: impl Into<String>, position: Position) -> Self {
        PositionMachine {
            asset: asset.into(),
            position,
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// The transaction `signal` would produce, without changing state.
    pub fn transition(&self, signal: Signal) -> Option<TransactionKind> {
        match (self.position, signal) {
            (Position::Flat, Signal::TakeLong) => Some(TransactionKind::Long),
            (Position::Flat, Signal::TakeShort) => Some(TransactionKind::Short),
            (Position::Long, Signal::CloseLong) => Some(TransactionKind::ClosingLong),
            (Position::Short, Signal::CloseShort) => Some(TransactionKind::ClosingShort),
            _ => None,
        }
    }

    pub fn commit(&mut self, kind: TransactionKind, timestamp: NaiveDateTime) -> Transaction {
        self.position = kind.resulting_position();
        Transaction {
            timestamp,
            asset: self.asset.clone(),
            kind,
        }
    }

    pub fn apply(&mut self, signal: Signal, timestamp: NaiveDateTime) -> Option<Transaction> {
        let kind = self.transition(signal)?;
        Some(self.commit(kind, timestamp))
    }
}
