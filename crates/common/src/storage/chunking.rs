use bytes::Bytes;

/// A slice of a payload, indexed from zero.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: u32,
    pub data: Bytes,
}

/// Split `data` into `chunk_size` pieces without copying. The last chunk may
/// be shorter; an empty payload yields no chunks.
pub fn split_into_chunks(data: &Bytes, chunk_size: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    (0..data.len())
        .step_by(chunk_size)
        .enumerate()
        .map(|(index, start)| Chunk {
            index: index as u32,
            data: data.slice(start..(start + chunk_size).min(data.len())),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_empty() {
        assert!(split_into_chunks(&Bytes::new(), 16).is_empty());
    }

    #[test]
    fn test_split_exact_boundary() {
        let data = Bytes::from(vec![0xBB; 64]);
        let chunks = split_into_chunks(&data, 32);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.data.len() == 32));
    }

    #[test]
    fn test_split_with_tail() {
        let data = Bytes::from((0..100u8).collect::<Vec<_>>());
        let chunks = split_into_chunks(&data, 30);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3].data.len(), 10);
        assert_eq!(chunks[3].index, 3);
        let rejoined: Vec<u8> = chunks.iter().flat_map(|c| c.data.to_vec()).collect();
        assert_eq!(rejoined, data.to_vec());
    }
}
