use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::error::Result;
use crate::server::{get_server_file_string, has_server_file, write_server_file};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub aud: String,
    pub exp: u64,
}

pub fn verify_with(token: &str, public_pem: &[u8], server: &str) -> Result<Claims> {
    let public_key = DecodingKey::from_rsa_pem(public_pem).map_err(|_| Error::AuthFailInvalidToken)?;
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[server]);
    let token_data = match decode::<Claims>(token, &public_key, &validation) {
        Ok(token) => token,
        Err(e) => match e.kind() {
            ErrorKind::InvalidToken => return Err(Error::AuthFailTokenWrongFormat),
            ErrorKind::InvalidSignature => return Err(Error::AuthFailInvalidToken),
            ErrorKind::MissingRequiredClaim(_) => return Err(Error::AuthFailInvalidToken),
            ErrorKind::ExpiredSignature => return Err(Error::AuthFailExpiredToken),
            ErrorKind::InvalidIssuer => return Err(Error::AuthFailInvalidToken),
            ErrorKind::InvalidAudience => return Err(Error::AuthFailNotForThisServer),
            ErrorKind::InvalidSubject => return Err(Error::AuthFailInvalidToken),
            _ => return Err(Error::AuthFailInvalidToken),
        },
    };
    Ok(token_data.claims)
}

pub fn sign_with(claims: &Claims, private_pem: &[u8]) -> Result<String> {
    let key = EncodingKey::from_rsa_pem(private_pem).map_err(|_| Error::AuthFail)?;
    let token = encode(&Header::new(Algorithm::RS256), claims, &key).map_err(|_| Error::AuthFail)?;
    Ok(token)
}

/// Verify a token against this server's public key.
pub async fn verify(token: &str, server: &str) -> Result<Claims> {
    let public_pem = get_server_file_string("pubkey.pem").await?.ok_or(Error::AuthFail)?;
    verify_with(token, public_pem.as_bytes(), server)
}

/// Sign a token with this server's private key.
pub async fn sign(claims: &Claims) -> Result<String> {
    let private_pem = get_server_file_string("private.pem").await?.ok_or(Error::AuthFail)?;
    sign_with(claims, private_pem.as_bytes())
}

pub async fn get_or_init_keys() -> Result<()> {
    if has_server_file("pubkey.pem").await && has_server_file("private.pem").await {
        return Ok(());
    }

    let mut rng = rand::thread_rng();
    let bits = 2048;
    let priv_key = RsaPrivateKey::new(&mut rng, bits).map_err(|_| Error::AuthFail)?;
    let pub_key = RsaPublicKey::from(&priv_key);

    let pubkeystring = pub_key.to_public_key_pem(rsa::pkcs8::LineEnding::CRLF).map_err(|_| Error::AuthFail)?;
    let prvkeystring = priv_key.to_pkcs8_pem(rsa::pkcs8::LineEnding::CRLF).map_err(|_| Error::AuthFail)?;

    write_server_file("pubkey.pem", pubkeystring.as_bytes()).await?;
    write_server_file("private.pem", prvkeystring.as_bytes()).await?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};

    use crate::tools::get_time;

    use super::*;

    fn test_keys() -> (String, String) {
        let mut rng = rand::thread_rng();
        let priv_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pub_key = RsaPublicKey::from(&priv_key);
        (
            priv_key.to_pkcs8_pem(rsa::pkcs8::LineEnding::CRLF).unwrap().to_string(),
            pub_key.to_public_key_pem(rsa::pkcs8::LineEnding::CRLF).unwrap(),
        )
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let (private_pem, public_pem) = test_keys();
        let claims = Claims {
            sub: "user1".to_string(),
            name: "Test User".to_string(),
            aud: "SERVER1".to_string(),
            exp: get_time().as_secs() + 60,
        };
        let token = sign_with(&claims, private_pem.as_bytes()).unwrap();
        let verified = verify_with(&token, public_pem.as_bytes(), "SERVER1").unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn rejects_other_audience() {
        let (private_pem, public_pem) = test_keys();
        let claims = Claims {
            sub: "user1".to_string(),
            name: "Test User".to_string(),
            aud: "SERVER1".to_string(),
            exp: get_time().as_secs() + 60,
        };
        let token = sign_with(&claims, private_pem.as_bytes()).unwrap();
        let error = verify_with(&token, public_pem.as_bytes(), "OTHERSERVER").unwrap_err();
        assert!(matches!(error, Error::AuthFailNotForThisServer));
    }

    #[test]
    fn rejects_expired_token() {
        let (private_pem, public_pem) = test_keys();
        let claims = Claims {
            sub: "user1".to_string(),
            name: "Test User".to_string(),
            aud: "SERVER1".to_string(),
            exp: 1000,
        };
        let token = sign_with(&claims, private_pem.as_bytes()).unwrap();
        let error = verify_with(&token, public_pem.as_bytes(), "SERVER1").unwrap_err();
        assert!(matches!(error, Error::AuthFailExpiredToken));
    }
}
