use std::sync::Arc;

/// A demultiplexed chunk of elementary-stream data.
///
/// A timestamp of zero or below is treated the same as a missing one: the
/// presentation time of the frames it yields is extrapolated.
#[derive(Debug, Clone)]
pub struct InputPacket {
    pub data: Arc<[u8]>,
    pub pts: Option<i64>,
}

impl InputPacket {
    pub fn new(data: impl Into<Arc<[u8]>>, pts: Option<i64>) -> Self {
        Self {
            data: data.into(),
            pts,
        }
    }

    /// The packet timestamp, if it can anchor presentation times.
    pub fn authoritative_pts(&self) -> Option<i64> {
        self.pts.filter(|&pts| pts > 0)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for InputPacket {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[test]
fn zero_pts_is_not_authoritative() {
    let packet = InputPacket::new(vec![1, 2, 3], Some(0));
    assert_eq!(packet.authoritative_pts(), None);
    assert_eq!(packet.len(), 3);

    let packet = InputPacket::new(Vec::new(), Some(40_000));
    assert_eq!(packet.authoritative_pts(), Some(40_000));
    assert!(packet.is_empty());
}
