use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder};
use std::io::{self, Read};

pub const ENC_NONE: &str = "identity";
pub const ENC_GZIP: &str = "gzip";
pub const ENC_DEFLATE: &str = "deflate";
pub const ENC_ZSTD: &str = "zstd";

fn decode_gzip(data: &[u8]) -> io::Result<Bytes> {
    let mut decoder = GzDecoder::new(data);
    let mut decoded_data = Vec::new();
    decoder.read_to_end(&mut decoded_data)?;
    Ok(Bytes::from(decoded_data))
}

fn decode_deflate(data: &[u8]) -> io::Result<Bytes> {
    let mut decoder = DeflateDecoder::new(data);
    let mut decoded_data = Vec::new();
    decoder.read_to_end(&mut decoded_data)?;
    Ok(Bytes::from(decoded_data))
}

fn decode_zstd(data: &[u8]) -> io::Result<Bytes> {
    Ok(Bytes::from(zstd::decode_all(data)?))
}

/// Undo the `Content-Encoding` of a response body. Unknown encodings are
/// passed through untouched and left for the JSON parser to reject.
pub fn decode_body(data: Bytes, encoding: &str) -> io::Result<Bytes> {
    match encoding.trim().to_ascii_lowercase().as_str() {
        ENC_GZIP => decode_gzip(&data),
        ENC_DEFLATE => decode_deflate(&data),
        ENC_ZSTD => decode_zstd(&data),
        _ => Ok(data),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_gzip_should_return_json_body() {
        let data = vec![
            31, 139, 8, 0, 0, 0, 0, 0, 0, 255, 43, 73, 45, 46, 137, 55, 52, 50, 6, 0, 21, 191, 53,
            241, 8, 0, 0, 0,
        ];
        let result = decode_body(Bytes::from(data), "gzip").unwrap();
        assert_eq!(&result[..], b"test_123");
    }

    #[test]
    fn decode_deflate_should_return_json_body() {
        let data = vec![43, 73, 45, 46, 137, 55, 52, 50, 6, 0];
        let result = decode_body(Bytes::from(data), "Deflate").unwrap();
        assert_eq!(&result[..], b"test_123");
    }

    #[test]
    fn decode_zstd_should_return_json_body() {
        let data = vec![
            40, 181, 47, 253, 0, 88, 65, 0, 0, 116, 101, 115, 116, 95, 49, 50, 51,
        ];
        let result = decode_body(Bytes::from(data), ENC_ZSTD).unwrap();
        assert_eq!(&result[..], b"test_123");
    }

    #[test]
    fn identity_and_unknown_encodings_pass_through() {
        let body = Bytes::from_static(b"{\"clean\":\"x\"}");
        assert_eq!(decode_body(body.clone(), ENC_NONE).unwrap(), body);
        assert_eq!(decode_body(body.clone(), "br").unwrap(), body);
    }

    #[test]
    fn corrupt_gzip_is_an_error() {
        assert!(decode_body(Bytes::from_static(b"not gzip"), ENC_GZIP).is_err());
    }
}
