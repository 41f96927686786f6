use chrono::{DateTime, Utc};
use x509_parser::prelude::*;
use x509_parser::time::ASN1Time;

use super::errors::{ParseError, ParseResult};
use super::types::CrlFields;

/// PEM armor marker; this parser accepts raw DER only.
const PEM_HEADER: &[u8] = b"-----BEGIN";

/// Decodes a DER-encoded CRL into the fields the housekeeping job persists.
///
/// The input must be exactly one CRL: truncation, trailing bytes, or PEM
/// armor fail outright so a bad download can never land in the store looking
/// complete. Serial numbers keep their full precision: they are rendered as
/// uppercase hex of the big-endian magnitude, never squeezed into a
/// fixed-width integer. At most `sample_size` serials are kept, in listed
/// order.
pub fn parse_crl(blob: &[u8], sample_size: usize) -> ParseResult<CrlFields> {
    if blob.is_empty() {
        return Err(ParseError::Truncated);
    }
    if blob.starts_with(PEM_HEADER) {
        return Err(ParseError::UnsupportedEncoding);
    }

    let (rem, crl) = CertificateRevocationList::from_der(blob).map_err(|e| match e {
        x509_parser::nom::Err::Incomplete(_) => ParseError::Truncated,
        other => ParseError::Malformed(X509Error::from(other).to_string()),
    })?;
    if !rem.is_empty() {
        return Err(ParseError::Malformed(format!(
            "{} trailing bytes after the CRL structure",
            rem.len()
        )));
    }

    let tbs = &crl.tbs_cert_list;
    let revoked_serials_sample = tbs
        .revoked_certificates
        .iter()
        .take(sample_size)
        .map(|revoked| hex::encode_upper(revoked.user_certificate.to_bytes_be()))
        .collect();

    Ok(CrlFields {
        issuer: tbs.issuer.to_string(),
        this_update: Some(asn1_time_to_chrono(tbs.this_update)),
        next_update: tbs.next_update.map(asn1_time_to_chrono),
        revoked_count: tbs.revoked_certificates.len(),
        revoked_serials_sample,
    })
}

/// Helper to convert x509-parser's ASN1Time to chrono's DateTime<Utc>
fn asn1_time_to_chrono(asn1_time: ASN1Time) -> DateTime<Utc> {
    let system_time: std::time::SystemTime = asn1_time.to_datetime().into();
    DateTime::<Utc>::from(system_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_truncated() {
        assert!(matches!(parse_crl(&[], 10), Err(ParseError::Truncated)));
    }

    #[test]
    fn pem_armor_is_an_unsupported_encoding() {
        let pem = b"-----BEGIN X509 CRL-----\nMIIB\n-----END X509 CRL-----\n";
        assert!(matches!(
            parse_crl(pem, 10),
            Err(ParseError::UnsupportedEncoding)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_crl(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01], 10).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Malformed(_) | ParseError::Truncated
        ));
    }
}
