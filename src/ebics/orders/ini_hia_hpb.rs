//! INI (submit signature key), HIA (submit auth+encryption keys), and HPB
//! (fetch bank keys) — the EBICS key-management orders (`spec.md` §4.3/S5).

use data_encoding::BASE64;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;

use crate::ebics::error::EbicsError;
use crate::xml::{el, to_xml_string, Element, ElementBuilder};

use super::HostIdentity;

fn rsa_key_value(key: &RsaPublicKey) -> ElementBuilder {
    el("RSAKeyValue")
        .child(el("Modulus").text(BASE64.encode(&key.n().to_bytes_be())))
        .child(el("Exponent").text(BASE64.encode(&key.e().to_bytes_be())))
}

fn pub_key_order_data(identity: &HostIdentity, keys: &[("SignatureCertificateVersion", &RsaPublicKey, &str)]) -> String {
    let mut pub_key_infos = el("PubKeyInfos");
    for (_, key, version) in keys {
        pub_key_infos = pub_key_infos.child(
            el("PubKeyInfo")
                .child(el("PubKeyValue").child(rsa_key_value(key)))
                .child(el("AuthorizationLevel").text("T"))
                .child(el("VersionNumber").text(version.to_string())),
        );
    }

    let doc = el("SignaturePubKeyOrderData")
        .attr("xmlns", "http://www.ebics.org/S001")
        .child(
            el("SignaturePubKeyInfo")
                .child(pub_key_infos)
                .child(el("PartnerID").text(identity.partner_id.clone()))
                .child(el("UserID").text(identity.user_id.clone())),
        );

    to_xml_string(doc)
}

/// Builds the INI request body's order data (the signature key's public
/// half, EBICS order-data format `A006`).
pub fn build_ini_order_data(identity: &HostIdentity, signature_pub: &RsaPublicKey) -> String {
    pub_key_order_data(identity, &[("SignatureCertificateVersion", signature_pub, "A006")])
}

/// Builds the HIA request body's order data (authentication + encryption
/// public keys, formats `X002`/`E002`).
pub fn build_hia_order_data(
    identity: &HostIdentity,
    authentication_pub: &RsaPublicKey,
    encryption_pub: &RsaPublicKey,
) -> String {
    pub_key_order_data(
        identity,
        &[
            ("SignatureCertificateVersion", authentication_pub, "X002"),
            ("SignatureCertificateVersion", encryption_pub, "E002"),
        ],
    )
}

/// Parses the decrypted, decompressed HPB response order data, returning
/// `(authentication_pub, encryption_pub)`. The bank wraps both the same way
/// the client does for HIA, so the shapes are symmetric.
pub fn parse_hpb_order_data(order_data_xml: &[u8]) -> Result<(RsaPublicKey, RsaPublicKey), EbicsError> {
    let text = std::str::from_utf8(order_data_xml)
        .map_err(|e| EbicsError::Protocol(format!("HPB order data is not UTF-8: {e}")))?;
    let root = Element::parse(text).map_err(|e| EbicsError::Protocol(e.to_string()))?;

    let info = root
        .optional_child("HIARequestOrderData")
        .or_else(|| root.optional_child("HIAResponseOrderData"))
        .or_else(|| root.optional_child("SignaturePubKeyInfo"))
        .unwrap_or(&root);
    let pub_key_infos = info.optional_child("PubKeyInfos").unwrap_or(info);

    let mut auth = None;
    let mut enc = None;

    for pub_key_info in pub_key_infos.all_children("PubKeyInfo") {
        let version = pub_key_info.optional_text_child("VersionNumber").unwrap_or_default();
        let key_value = pub_key_info
            .require_child("PubKeyValue")
            .map_err(|e| EbicsError::Protocol(e.to_string()))?
            .require_child("RSAKeyValue")
            .map_err(|e| EbicsError::Protocol(e.to_string()))?;
        let key = decode_rsa_key_value(key_value)?;

        match version.as_str() {
            "X002" => auth = Some(key),
            "E002" => enc = Some(key),
            _ => {}
        }
    }

    let auth = auth.ok_or_else(|| EbicsError::Protocol("HPB response missing X002 authentication key".to_string()))?;
    let enc = enc.ok_or_else(|| EbicsError::Protocol("HPB response missing E002 encryption key".to_string()))?;
    Ok((auth, enc))
}

fn decode_rsa_key_value(key_value: &Element) -> Result<RsaPublicKey, EbicsError> {
    let modulus_b64 = key_value.require_text_child("Modulus").map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let exponent_b64 = key_value.require_text_child("Exponent").map_err(|e| EbicsError::Protocol(e.to_string()))?;

    let modulus = BASE64
        .decode(modulus_b64.as_bytes())
        .map_err(|e| EbicsError::Protocol(format!("bad modulus encoding: {e}")))?;
    let exponent = BASE64
        .decode(exponent_b64.as_bytes())
        .map_err(|e| EbicsError::Protocol(format!("bad exponent encoding: {e}")))?;

    RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&modulus),
        rsa::BigUint::from_bytes_be(&exponent),
    )
    .map_err(|e| EbicsError::Protocol(format!("invalid RSA key material from bank: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::gen_rsa;

    fn identity() -> HostIdentity {
        HostIdentity {
            host_id: "HOST01".to_string(),
            user_id: "USER01".to_string(),
            partner_id: "PARTNER01".to_string(),
            system_id: None,
        }
    }

    #[test]
    fn ini_order_data_round_trips_through_hpb_parser() {
        let sig = gen_rsa(2048).unwrap();
        let auth = gen_rsa(2048).unwrap();
        let enc = gen_rsa(2048).unwrap();

        let hia_xml = build_hia_order_data(&identity(), &auth.public, &enc.public);
        let (parsed_auth, parsed_enc) = parse_hpb_order_data(hia_xml.as_bytes()).unwrap();

        assert_eq!(parsed_auth.n(), auth.public.n());
        assert_eq!(parsed_enc.n(), enc.public.n());
        let _ = build_ini_order_data(&identity(), &sig.public);
    }

    #[test]
    fn rejects_hpb_data_missing_a_key() {
        let enc = gen_rsa(2048).unwrap();
        let xml = pub_key_order_data(&identity(), &[("SignatureCertificateVersion", &enc.public, "E002")]);
        assert!(parse_hpb_order_data(xml.as_bytes()).is_err());
    }
}
