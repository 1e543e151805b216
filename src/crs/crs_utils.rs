use libc::c_char;
use std::{
    ffi::{c_int, CStr, CString},
    fmt,
    ptr::null_mut,
    str::FromStr,
};

use anyhow::anyhow;
use serde::Deserialize;

pub type EpsgCode = u32;

/// Coordinate reference system, identified by an authority and a code, e.g. `EPSG:4326`.
///
/// Parses from and displays as `AUTHORITY:CODE`, which is also the form PROJ accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Crs {
    authority: String,
    code: u32,
}

impl Crs {
    pub fn from_epsg(code: EpsgCode) -> Self {
        Self {
            authority: "EPSG".to_string(),
            code,
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    /// The EPSG code, if this CRS is defined by the EPSG authority.
    pub fn epsg_code(&self) -> Option<EpsgCode> {
        (self.authority == "EPSG").then_some(self.code)
    }

    pub fn to_spatial_ref(&self) -> anyhow::Result<gdal::spatial_ref::SpatialRef> {
        let spatial_ref = match self.epsg_code() {
            Some(code) => gdal::spatial_ref::SpatialRef::from_epsg(code)?,
            None => gdal::spatial_ref::SpatialRef::from_definition(&self.to_string())?,
        };
        Ok(spatial_ref)
    }

    pub fn is_geographic(&self) -> anyhow::Result<bool> {
        Ok(self.to_spatial_ref()?.is_geographic())
    }
}

pub fn epsg_4326() -> Crs {
    Crs::from_epsg(4326)
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.code)
    }
}

impl FromStr for Crs {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (authority, code) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| anyhow!("CRS '{}' is not of the form AUTHORITY:CODE", s))?;
        if authority.is_empty() {
            return Err(anyhow!("CRS '{}' has an empty authority", s));
        }
        let code: u32 = code
            .parse()
            .map_err(|err| anyhow!("CRS '{}' has an invalid code, {}", s, err))?;
        Ok(Self {
            authority: authority.to_uppercase(),
            code,
        })
    }
}

impl TryFrom<String> for Crs {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        value.parse()
    }
}

impl TryFrom<&gdal::spatial_ref::SpatialRef> for Crs {
    type Error = anyhow::Error;

    fn try_from(spatial_ref: &gdal::spatial_ref::SpatialRef) -> anyhow::Result<Self> {
        let authority = spatial_ref
            .auth_name()
            .map_err(|err| anyhow!("Spatial reference has no authority name. {}", err))?;
        let code = spatial_ref
            .auth_code()
            .map_err(|err| anyhow!("Spatial reference has no authority code. {}", err))?;
        Ok(Self {
            authority: authority.to_uppercase(),
            code: u32::try_from(code)?,
        })
    }
}

/// Query UTM zones which contain the lon/lat WGS84 coordinate.
///
/// # Arguments
/// * lon - longitude in degrees.
/// * lat - latitude in degrees.
/// * datum_name - the name of the geodetic datum to query for. Example: "WGS84", "NAD83". If not specified, zones
///     with all datums are returned.
///
/// # Returns
/// EPSG authority codes for the found UTM zones.
pub fn query_utm_crs_info(
    lon: f64,
    lat: f64,
    datum_name: Option<&str>,
) -> anyhow::Result<Vec<EpsgCode>> {
    let mut results = Vec::new();
    let auth_name = CString::new("EPSG")?;
    unsafe {
        let context = proj_sys::proj_context_create();
        let crs_types: [proj_sys::PJ_TYPE; 1] = [proj_sys::PJ_TYPE_PJ_TYPE_PROJECTED_CRS];
        let query_params = proj_sys::proj_get_crs_list_parameters_create();
        (*query_params).types = crs_types.as_ptr();
        (*query_params).typesCount = 1;

        (*query_params).bbox_valid = true as i32;
        (*query_params).west_lon_degree = lon;
        (*query_params).south_lat_degree = lat;
        (*query_params).east_lon_degree = lon;
        (*query_params).north_lat_degree = lat;

        let out_result_count: *mut c_int = null_mut();

        let crs_info_list = proj_sys::proj_get_crs_info_list_from_database(
            context,
            auth_name.as_ptr(),
            query_params,
            out_result_count,
        );
        proj_sys::proj_get_crs_list_parameters_destroy(query_params);

        if crs_info_list.is_null() {
            proj_sys::proj_context_destroy(context);
            return Err(anyhow!("Failed to query UTM zones."));
        }

        let mut cursor = crs_info_list;
        let mut scan_result = Ok(());
        while !(*cursor).is_null() {
            let crs_info = **cursor;
            cursor = cursor.offset(1);
            match utm_code_for_crs_info(crs_info.name, crs_info.code, datum_name) {
                Ok(Some(code)) => results.push(code),
                Ok(None) => {}
                Err(err) => {
                    scan_result = Err(err);
                    break;
                }
            }
        }
        // The list owns the name and code strings, destroy it only after scanning.
        proj_sys::proj_crs_info_list_destroy(crs_info_list);
        proj_sys::proj_context_destroy(context);
        scan_result?;
    }
    Ok(results)
}

/// Returns the EPSG code of a CRS info entry if it is a UTM zone with the requested datum.
///
/// # Safety
/// `name` and `code` must be valid nul-terminated strings.
unsafe fn utm_code_for_crs_info(
    name: *const c_char,
    code: *const c_char,
    datum_name: Option<&str>,
) -> anyhow::Result<Option<EpsgCode>> {
    let crs_name = c_ptr_as_str(name)?;
    if !crs_name.contains("UTM zone") {
        return Ok(None);
    }
    if let Some(datum_name) = datum_name {
        // UTM zone names start with the datum name as e.g. "WGS 84 / UTM zone ..."
        let crs_datum = crs_name
            .split('/')
            .next()
            .ok_or_else(|| anyhow!("CRS '{}' does not have a datum specifier", crs_name))?
            .replace(' ', "");
        if crs_datum != datum_name {
            return Ok(None);
        }
    }
    Ok(Some(c_ptr_as_str(code)?.parse()?))
}

unsafe fn c_ptr_as_str<'a>(c_string: *const c_char) -> anyhow::Result<&'a str> {
    CStr::from_ptr(c_string)
        .to_str()
        .map_err(|err| anyhow!("Could not decode string {}", err))
}
