//! tf-idf relevance

/// Inverse document frequency, smoothed so unseen terms stay finite
pub fn idf(doc_freq: u64, num_docs: u64) -> f32 {
    1.0 + ((num_docs as f32 + 1.0) / (doc_freq as f32 + 1.0)).ln()
}

/// Sub-linear term frequency
pub fn tf(freq: u32) -> f32 {
    (freq as f32).sqrt()
}

/// Shorter fields weigh more per occurrence
pub fn length_norm(field_length: u32) -> f32 {
    if field_length == 0 {
        1.0
    } else {
        1.0 / (field_length as f32).sqrt()
    }
}

/// Score contribution of one term in one field of one document
pub fn tf_idf(freq: u32, doc_freq: u64, num_docs: u64, field_length: u32, boost: f32) -> f32 {
    if freq == 0 {
        return 0.0;
    }
    let idf = idf(doc_freq, num_docs);
    tf(freq) * idf * idf * length_norm(field_length) * boost
}
