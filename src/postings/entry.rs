//! A single posting: one document and the positions of a term in it.

/// Document identifier.
pub type DocId = u32;

/// The occurrences of a term within one document.
///
/// The document ID is fixed at construction. Positions are kept in arrival
/// order, which is ascending as long as the token stream is.
#[derive(Debug, Clone, Default)]
pub struct PostingsEntry {
    doc_id: DocId,

    /// Token offsets of the term inside the document.
    pub positions: Vec<u32>,

    /// Score assigned by an external ranker. Not persisted.
    pub score: f64,
}

impl PostingsEntry {
    /// Create an entry with no positions.
    pub fn new(doc_id: DocId) -> Self {
        PostingsEntry {
            doc_id,
            positions: Vec::new(),
            score: 0.0,
        }
    }

    /// Create an entry holding a single position.
    pub fn with_position(doc_id: DocId, position: u32) -> Self {
        PostingsEntry {
            doc_id,
            positions: vec![position],
            score: 0.0,
        }
    }

    pub fn with_positions(doc_id: DocId, positions: Vec<u32>) -> Self {
        PostingsEntry {
            doc_id,
            positions,
            score: 0.0,
        }
    }

    pub fn doc_id(&self) -> DocId {
        self.doc_id
    }

    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    pub fn add_position(&mut self, position: u32) {
        self.positions.push(position);
    }

    /// Append positions after the ones already held.
    pub fn add_positions(&mut self, positions: &[u32]) {
        self.positions.extend_from_slice(positions);
    }
}

// Score is ranking state, not part of a posting's identity.
impl PartialEq for PostingsEntry {
    fn eq(&self, other: &Self) -> bool {
        self.doc_id == other.doc_id && self.positions == other.positions
    }
}

impl Eq for PostingsEntry {}
